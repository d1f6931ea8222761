use std::collections::BTreeSet;
use std::sync::Arc;

use packsmith_api::{
    AddStickerRequest, CreatePackageRequest, IngestOutcome, PacksmithApi, PacksmithConfig,
    UpdateMetadataRequest,
};
use packsmith_backup::{export_backup, inspect_backup, restore_backup};
use packsmith_core::{
    hash_file, AssetDir, MemoryWhitelist, NewPackage, NewSticker, PacksmithError,
    MAX_STICKERS_PER_PACK,
};
use packsmith_provider::{
    CellValue, PackQueryService, ANIMATED_STICKER_PACK, IMAGE_DATA_VERSION,
    STICKER_PACK_IDENTIFIER,
};
use packsmith_store_sqlite::SqliteStore;
use tempfile::TempDir;

fn api(dir: &TempDir) -> PacksmithApi {
    PacksmithApi::new(PacksmithConfig::from_data_dir(dir.path()))
}

fn write_image(api: &PacksmithApi, name: &str, bytes: &[u8]) {
    api.assets()
        .write_atomic(name, &mut &bytes[..])
        .unwrap_or_else(|err| panic!("failed to write {name}: {err}"));
}

fn create(api: &PacksmithApi, name: &str) -> String {
    api.create_package(CreatePackageRequest {
        name: name.to_string(),
        author: "Ana".to_string(),
        ..CreatePackageRequest::default()
    })
    .unwrap_or_else(|err| panic!("create failed: {err}"))
    .package
    .identifier
}

fn add(api: &PacksmithApi, identifier: &str, file: &str, emoji: &str) -> IngestOutcome {
    api.add_sticker(AddStickerRequest {
        identifier: identifier.to_string(),
        image_file: file.to_string(),
        emojis: vec![emoji.to_string()],
        width: None,
        height: None,
    })
    .unwrap_or_else(|err| panic!("add sticker failed: {err}"))
}

#[test]
fn faces_scenario_end_to_end() {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("failed to create temp dir: {err}"));
    let db_path = dir.path().join("packsmith.sqlite3");
    let assets = AssetDir::create(dir.path().join("files"))
        .unwrap_or_else(|err| panic!("failed to create asset dir: {err}"));
    let mut store = SqliteStore::open(&db_path).unwrap_or_else(|err| panic!("open failed: {err}"));
    store.migrate().unwrap_or_else(|err| panic!("migrate failed: {err}"));

    let package = NewPackage::new("Faces", "Ana");
    let package_id = store.create_package(&package).unwrap_or_else(|err| panic!("create failed: {err}"));
    let created = store
        .get_package(package_id)
        .unwrap_or_else(|err| panic!("load failed: {err}"))
        .unwrap_or_else(|| panic!("package missing"));
    assert_eq!(created.package.image_data_version, "1");

    for (index, emoji) in ["😀", "😂", "😢"].into_iter().enumerate() {
        let file = format!("sticker_{index}.webp");
        assets
            .write_atomic(&file, &mut format!("image {index}").as_bytes())
            .unwrap_or_else(|err| panic!("write failed: {err}"));
        let mut sticker = NewSticker::new(package_id, file.clone(), vec![emoji.to_string()]);
        sticker.image_file_hash = assets.hash(&file);
        store.add_sticker(&sticker).unwrap_or_else(|err| panic!("sticker failed: {err}"));
    }

    let service = PackQueryService::new(&db_path, assets.clone())
        .unwrap_or_else(|err| panic!("service failed: {err}"));
    assert!(service.query("/metadata").is_empty());

    let mut promoted = created.package.clone();
    promoted.tray_image_file = "sticker_0.webp".to_string();
    store.update_package(&promoted).unwrap_or_else(|err| panic!("update failed: {err}"));

    let listed = service.query("/metadata");
    assert_eq!(listed.len(), 1);
    assert_eq!(
        listed.value(0, STICKER_PACK_IDENTIFIER),
        Some(&CellValue::Text(package.identifier.clone()))
    );
    assert_eq!(listed.value(0, IMAGE_DATA_VERSION), Some(&CellValue::from("1")));
    assert_eq!(listed.value(0, ANIMATED_STICKER_PACK), Some(&CellValue::Integer(0)));

    let archive = dir.path().join("backup.zip");
    let sink = std::fs::File::create(&archive).unwrap_or_else(|err| panic!("create failed: {err}"));
    export_backup(&store, &assets, 1, sink).unwrap_or_else(|err| panic!("export failed: {err}"));

    assert!(store.delete_package(package_id).unwrap_or(false));
    for name in assets.list().unwrap_or_default() {
        assets.remove(&name).unwrap_or_else(|err| panic!("wipe failed: {err}"));
    }
    assert!(store.list_packages().unwrap_or_default().is_empty());

    let open = || std::fs::File::open(&archive).unwrap_or_else(|err| panic!("open failed: {err}"));
    let document = inspect_backup(open()).unwrap_or_else(|err| panic!("inspect failed: {err}"));
    assert_eq!(document.packages.len(), 1);
    assert_eq!(document.packages[0].stickers.len(), 3);

    let selected = BTreeSet::from([package.identifier.clone()]);
    restore_backup(&mut store, &assets, open(), &selected)
        .unwrap_or_else(|err| panic!("restore failed: {err}"));

    let packages = store.list_packages().unwrap_or_default();
    assert_eq!(packages.len(), 1);
    assert_eq!(packages[0].identifier, package.identifier);
    assert_ne!(packages[0].id, package_id);
    let restored = store
        .get_package(packages[0].id)
        .unwrap_or_else(|err| panic!("load failed: {err}"))
        .unwrap_or_else(|| panic!("restored package missing"));
    assert_eq!(restored.stickers.len(), 3);
    for sticker in &restored.stickers {
        assert_eq!(sticker.image_file_hash, hash_file(&assets.root().join(&sticker.image_file)));
    }
}

#[test]
fn ingestion_promotes_tray_and_bumps_version() {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("failed to create temp dir: {err}"));
    let api = api(&dir);
    let identifier = create(&api, "Faces");
    write_image(&api, "one.webp", b"one");
    write_image(&api, "two.webp", b"two");

    let IngestOutcome::Added { package, sticker } = add(&api, &identifier, "one.webp", "😀") else {
        panic!("first sticker should be added");
    };
    assert_eq!(package.tray_image_file, "one.webp");
    assert_eq!(package.image_data_version, "2");
    assert!(!sticker.image_file_hash.is_empty());

    let IngestOutcome::Added { package, .. } = add(&api, &identifier, "two.webp", "😂") else {
        panic!("second sticker should be added");
    };
    assert_eq!(package.tray_image_file, "one.webp");
    assert_eq!(package.image_data_version, "3");

    let listing = api.list_packages().unwrap_or_else(|err| panic!("list failed: {err}"));
    assert_eq!(listing[0].sticker_count, 2);
    assert!(listing[0].exposed);
}

#[test]
fn duplicate_content_is_reported_not_stored() {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("failed to create temp dir: {err}"));
    let api = api(&dir);
    let identifier = create(&api, "Faces");
    write_image(&api, "one.webp", b"same bytes");
    write_image(&api, "copy.webp", b"same bytes");

    add(&api, &identifier, "one.webp", "😀");
    let outcome = add(&api, &identifier, "copy.webp", "😂");
    assert!(matches!(outcome, IngestOutcome::Duplicate { existing } if existing.image_file == "one.webp"));

    let joined = api
        .get_package(&identifier)
        .unwrap_or_else(|err| panic!("load failed: {err}"))
        .unwrap_or_else(|| panic!("package missing"));
    assert_eq!(joined.stickers.len(), 1);
}

#[test]
fn pack_ceiling_is_enforced() {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("failed to create temp dir: {err}"));
    let api = api(&dir);
    let identifier = create(&api, "Full");
    for index in 0..MAX_STICKERS_PER_PACK {
        let name = format!("s{index}.webp");
        write_image(&api, &name, name.as_bytes());
        add(&api, &identifier, &name, "😀");
    }
    write_image(&api, "extra.webp", b"extra");
    let result = api.add_sticker(AddStickerRequest {
        identifier: identifier.clone(),
        image_file: "extra.webp".to_string(),
        emojis: vec!["😀".to_string()],
        width: None,
        height: None,
    });
    assert!(matches!(result, Err(PacksmithError::ConstraintViolation(_))));
}

#[test]
fn missing_pack_or_file_is_not_found() {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("failed to create temp dir: {err}"));
    let api = api(&dir);
    let identifier = create(&api, "Faces");
    let request = |identifier: &str, file: &str| AddStickerRequest {
        identifier: identifier.to_string(),
        image_file: file.to_string(),
        emojis: vec!["😀".to_string()],
        width: None,
        height: None,
    };
    assert!(matches!(
        api.add_sticker(request(&identifier, "absent.webp")),
        Err(PacksmithError::NotFound(_))
    ));
    assert!(matches!(
        api.add_sticker(request("no-such-pack", "absent.webp")),
        Err(PacksmithError::NotFound(_))
    ));
    assert!(matches!(
        api.add_sticker(request(&identifier, "../escape.webp")),
        Err(PacksmithError::Security(_))
    ));
}

#[test]
fn delete_sticker_keeps_file_and_cleanup_removes_orphans() {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("failed to create temp dir: {err}"));
    let api = api(&dir);
    let identifier = create(&api, "Faces");
    write_image(&api, "one.webp", b"one");
    write_image(&api, "two.webp", b"two");
    write_image(&api, "stray.webp", b"stray");
    add(&api, &identifier, "one.webp", "😀");
    let IngestOutcome::Added { sticker, .. } = add(&api, &identifier, "two.webp", "😂") else {
        panic!("second sticker should be added");
    };

    assert!(api.delete_sticker(sticker.id).unwrap_or(false));
    assert!(api.assets().exists("two.webp"));
    let joined = api
        .get_package(&identifier)
        .unwrap_or_else(|err| panic!("load failed: {err}"))
        .unwrap_or_else(|| panic!("package missing"));
    assert_eq!(joined.package.image_data_version, "4");

    let preview = api.cleanup_orphan_files(true).unwrap_or_else(|err| panic!("cleanup failed: {err}"));
    assert_eq!(preview.removed, vec!["stray.webp".to_string(), "two.webp".to_string()]);
    assert!(api.assets().exists("stray.webp"));

    let report = api.cleanup_orphan_files(false).unwrap_or_else(|err| panic!("cleanup failed: {err}"));
    assert_eq!(report.removed.len(), 2);
    assert_eq!(report.kept, 1);
    assert_eq!(api.assets().list().unwrap_or_default(), vec!["one.webp".to_string()]);
}

#[test]
fn deleting_the_last_sticker_hides_the_pack() {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("failed to create temp dir: {err}"));
    let api = api(&dir);
    let identifier = create(&api, "Faces");
    write_image(&api, "one.webp", b"one");
    let IngestOutcome::Added { sticker, package } = add(&api, &identifier, "one.webp", "😀") else {
        panic!("sticker should be added");
    };
    assert_eq!(package.tray_image_file, "one.webp");

    let service = api.query_service().unwrap_or_else(|err| panic!("provider failed: {err}"));
    assert_eq!(service.query("/metadata").len(), 1);

    assert!(api.delete_sticker(sticker.id).unwrap_or(false));
    assert!(api.assets().exists("one.webp"));
    assert!(service.query("/metadata").is_empty());
    assert!(service.query(&format!("/metadata/{identifier}")).is_empty());
    assert!(service.query(&format!("/stickers/{identifier}")).is_empty());

    let listing = api.list_packages().unwrap_or_else(|err| panic!("list failed: {err}"));
    assert_eq!(listing[0].sticker_count, 0);
    assert!(!listing[0].exposed);
}

#[test]
fn metadata_update_keeps_identifier() {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("failed to create temp dir: {err}"));
    let api = api(&dir);
    let identifier = create(&api, "Faces");
    let updated = api
        .update_package_metadata(
            &identifier,
            UpdateMetadataRequest {
                name: Some("Funny Faces".to_string()),
                publisher_website: Some("https://example.com".to_string()),
                ..UpdateMetadataRequest::default()
            },
        )
        .unwrap_or_else(|err| panic!("update failed: {err}"));
    assert_eq!(updated.identifier, identifier);
    assert_eq!(updated.name, "Funny Faces");
    assert_eq!(updated.author, "Ana");

    let blank = api.update_package_metadata(
        &identifier,
        UpdateMetadataRequest { author: Some("  ".to_string()), ..UpdateMetadataRequest::default() },
    );
    assert!(matches!(blank, Err(PacksmithError::ConstraintViolation(_))));
    assert!(matches!(
        api.update_package_metadata("missing", UpdateMetadataRequest::default()),
        Err(PacksmithError::NotFound(_))
    ));
}

#[test]
fn subscribers_see_snapshots_after_each_write() {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("failed to create temp dir: {err}"));
    let api = api(&dir);
    let mut updates = api.subscribe().unwrap_or_else(|err| panic!("subscribe failed: {err}"));
    assert!(updates.borrow_and_update().is_empty());

    let identifier = create(&api, "Faces");
    assert!(updates.has_changed().unwrap_or(false));
    assert_eq!(updates.borrow_and_update().len(), 1);

    assert!(api.delete_package(&identifier).unwrap_or(false));
    assert!(updates.has_changed().unwrap_or(false));
    assert!(updates.borrow_and_update().is_empty());
}

#[test]
fn listing_reports_whitelist_flag() {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("failed to create temp dir: {err}"));
    let registry = Arc::new(MemoryWhitelist::new());
    let api = api(&dir).with_whitelist(registry.clone());
    let identifier = create(&api, "Faces");
    registry.add(identifier.clone());

    let listing = api.list_packages().unwrap_or_else(|err| panic!("list failed: {err}"));
    assert!(listing[0].whitelisted);
    assert!(!listing[0].exposed);
    assert!(api.is_whitelisted(&identifier));
}

#[test]
fn restore_through_the_facade_skips_existing_packs() {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("failed to create temp dir: {err}"));
    let api = api(&dir);
    let identifier = create(&api, "Faces");
    write_image(&api, "one.webp", b"one");
    add(&api, &identifier, "one.webp", "😀");

    let archive = dir.path().join("backup.zip");
    let summary = api.export_backup(&archive).unwrap_or_else(|err| panic!("export failed: {err}"));
    assert_eq!(summary.packages, 1);

    let mut plan = api.plan_restore(&archive).unwrap_or_else(|err| panic!("plan failed: {err}"));
    plan.select_all_new();
    assert!(plan.selected().is_empty());

    let forced = BTreeSet::from([identifier.clone()]);
    let summary = api
        .restore_backup(&archive, &forced)
        .unwrap_or_else(|err| panic!("restore failed: {err}"));
    assert_eq!(summary.skipped_existing, vec![identifier]);
    assert_eq!(api.list_packages().map(|list| list.len()).unwrap_or_default(), 1);
}

#[tokio::test]
async fn blocking_calls_run_off_the_async_runtime() {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("failed to create temp dir: {err}"));
    let api = api(&dir);
    let created = api
        .run(|api| {
            api.create_package(CreatePackageRequest {
                name: "Async".to_string(),
                author: "Ana".to_string(),
                ..CreatePackageRequest::default()
            })
        })
        .await
        .unwrap_or_else(|err| panic!("run failed: {err}"));
    assert_eq!(created.package.name, "Async");
    assert!(created.stickers.is_empty());
}
