use std::collections::BTreeSet;
use std::fs::File;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use packsmith_backup::{
    export_backup, inspect_backup, restore_backup, RestorePlan, RestoreStatus, ASSET_PREFIX,
    METADATA_ENTRY,
};
use packsmith_core::{hash_bytes, AssetDir, NewPackage, NewSticker, PacksmithError, CANVAS_SIZE};
use packsmith_store_sqlite::SqliteStore;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

struct Side {
    store: SqliteStore,
    assets: AssetDir,
}

fn side(root: &Path, name: &str) -> Side {
    let mut store = SqliteStore::open(&root.join(format!("{name}.sqlite3")))
        .unwrap_or_else(|err| panic!("failed to open store: {err}"));
    store.migrate().unwrap_or_else(|err| panic!("failed to migrate: {err}"));
    let assets = AssetDir::create(root.join(format!("{name}-files")))
        .unwrap_or_else(|err| panic!("failed to create asset dir: {err}"));
    Side { store, assets }
}

fn seed_pack(side: &mut Side, name: &str, files: &[(&str, &str)]) -> String {
    let mut package = NewPackage::new(name, "Ana");
    package.publisher_email = "ana@example.com".to_string();
    package.tray_image_file = files[0].0.to_string();
    let id = side.store.create_package(&package).unwrap_or_else(|err| panic!("create failed: {err}"));
    for (file, emoji) in files {
        side.assets
            .write_atomic(file, &mut file.as_bytes())
            .unwrap_or_else(|err| panic!("write failed: {err}"));
        let mut sticker = NewSticker::new(id, *file, vec![(*emoji).to_string()]);
        sticker.image_file_hash = side.assets.hash(file);
        side.store.add_sticker(&sticker).unwrap_or_else(|err| panic!("sticker failed: {err}"));
    }
    package.identifier
}

fn export_to(side: &Side, path: &Path) {
    let file = File::create(path).unwrap_or_else(|err| panic!("failed to create archive: {err}"));
    export_backup(&side.store, &side.assets, 7, file)
        .unwrap_or_else(|err| panic!("export failed: {err}"));
}

fn open(path: &Path) -> File {
    File::open(path).unwrap_or_else(|err| panic!("failed to open archive: {err}"))
}

fn archive_path(dir: &TempDir) -> PathBuf {
    dir.path().join("backup.zip")
}

#[test]
fn export_then_restore_all_into_empty_store_round_trips() {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("failed to create temp dir: {err}"));
    let mut source = side(dir.path(), "source");
    let faces = seed_pack(&mut source, "Faces", &[("a.webp", "😀"), ("b.webp", "😂")]);
    let cats = seed_pack(&mut source, "Cats", &[("c.webp", "🐱")]);
    export_to(&source, &archive_path(&dir));

    let document = inspect_backup(open(&archive_path(&dir)))
        .unwrap_or_else(|err| panic!("inspect failed: {err}"));
    assert_eq!(document.app_version, 7);
    assert_eq!(document.packages.len(), 2);

    let mut target = side(dir.path(), "target");
    let local = target.store.package_identifiers().unwrap_or_default();
    let mut plan = RestorePlan::new(&document, &local);
    plan.select_all_new();

    let summary = restore_backup(&mut target.store, &target.assets, open(&archive_path(&dir)), plan.selected())
        .unwrap_or_else(|err| panic!("restore failed: {err}"));
    assert_eq!(summary.packages_restored, 2);
    assert_eq!(summary.stickers_restored, 3);
    assert_eq!(summary.files_extracted, 3);
    assert!(summary.skipped_existing.is_empty());

    for identifier in [&faces, &cats] {
        let original = source
            .store
            .get_package_by_identifier(identifier)
            .unwrap_or_else(|err| panic!("load failed: {err}"))
            .unwrap_or_else(|| panic!("source package missing"));
        let restored = target
            .store
            .get_package_by_identifier(identifier)
            .unwrap_or_else(|err| panic!("load failed: {err}"))
            .unwrap_or_else(|| panic!("restored package missing"));

        assert_eq!(restored.package.name, original.package.name);
        assert_eq!(restored.package.author, original.package.author);
        assert_eq!(restored.package.publisher_email, original.package.publisher_email);
        assert_eq!(restored.package.tray_image_file, original.package.tray_image_file);
        assert_eq!(restored.package.image_data_version, original.package.image_data_version);
        assert_eq!(restored.stickers.len(), original.stickers.len());
        for (restored, original) in restored.stickers.iter().zip(&original.stickers) {
            assert_eq!(restored.image_file, original.image_file);
            assert_eq!(restored.emojis, original.emojis);
            assert_eq!(restored.image_file_hash, original.image_file_hash);
            assert_eq!(restored.image_file_hash, target.assets.hash(&restored.image_file));
        }
    }
}

#[test]
fn missing_files_are_skipped_on_export_and_restore_degrades() {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("failed to create temp dir: {err}"));
    let mut source = side(dir.path(), "source");
    let identifier = seed_pack(&mut source, "Faces", &[("a.webp", "😀"), ("b.webp", "😂")]);
    assert!(source.assets.remove("b.webp").unwrap_or(false));

    let file = File::create(archive_path(&dir)).unwrap_or_else(|err| panic!("create failed: {err}"));
    let summary = export_backup(&source.store, &source.assets, 1, file)
        .unwrap_or_else(|err| panic!("export failed: {err}"));
    assert_eq!(summary.files_written, 1);
    assert_eq!(summary.files_missing, vec!["b.webp".to_string()]);

    let mut target = side(dir.path(), "target");
    let selected = BTreeSet::from([identifier.clone()]);
    restore_backup(&mut target.store, &target.assets, open(&archive_path(&dir)), &selected)
        .unwrap_or_else(|err| panic!("restore failed: {err}"));
    let restored = target
        .store
        .get_package_by_identifier(&identifier)
        .unwrap_or_else(|err| panic!("load failed: {err}"))
        .unwrap_or_else(|| panic!("restored package missing"));
    assert_eq!(restored.stickers.len(), 2);
    assert_eq!(restored.stickers[1].size_in_kb, 0);
    assert!(!target.assets.exists("b.webp"));
}

#[test]
fn selective_restore_extracts_only_selected_files() {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("failed to create temp dir: {err}"));
    let mut source = side(dir.path(), "source");
    let faces = seed_pack(&mut source, "Faces", &[("a.webp", "😀")]);
    seed_pack(&mut source, "Cats", &[("c.webp", "🐱")]);
    export_to(&source, &archive_path(&dir));

    let mut target = side(dir.path(), "target");
    let selected = BTreeSet::from([faces.clone()]);
    let summary = restore_backup(&mut target.store, &target.assets, open(&archive_path(&dir)), &selected)
        .unwrap_or_else(|err| panic!("restore failed: {err}"));
    assert_eq!(summary.packages_restored, 1);
    assert_eq!(target.assets.list().unwrap_or_default(), vec!["a.webp".to_string()]);
    assert_eq!(target.store.package_identifiers().unwrap_or_default(), selected);
}

#[test]
fn existing_identifiers_are_never_duplicated() {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("failed to create temp dir: {err}"));
    let mut source = side(dir.path(), "source");
    let faces = seed_pack(&mut source, "Faces", &[("a.webp", "😀")]);
    export_to(&source, &archive_path(&dir));

    let document = inspect_backup(open(&archive_path(&dir)))
        .unwrap_or_else(|err| panic!("inspect failed: {err}"));
    let local = source.store.package_identifiers().unwrap_or_default();
    let mut plan = RestorePlan::new(&document, &local);
    assert_eq!(plan.status(&faces), Some(RestoreStatus::Exists));
    plan.select_all_new();
    assert!(plan.selected().is_empty());

    let forced = BTreeSet::from([faces.clone()]);
    let summary = restore_backup(&mut source.store, &source.assets, open(&archive_path(&dir)), &forced)
        .unwrap_or_else(|err| panic!("restore failed: {err}"));
    assert_eq!(summary.packages_restored, 0);
    assert_eq!(summary.skipped_existing, vec![faces]);
    assert_eq!(source.store.list_packages().map(|p| p.len()).unwrap_or_default(), 1);
}

fn hand_built_archive(metadata: Option<&str>, files: &[(&str, &[u8])]) -> Cursor<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    if let Some(metadata) = metadata {
        zip.start_file(METADATA_ENTRY, options).unwrap_or_else(|err| panic!("start failed: {err}"));
        zip.write_all(metadata.as_bytes()).unwrap_or_else(|err| panic!("write failed: {err}"));
    }
    for (name, bytes) in files {
        zip.start_file(format!("{ASSET_PREFIX}{name}"), options)
            .unwrap_or_else(|err| panic!("start failed: {err}"));
        zip.write_all(bytes).unwrap_or_else(|err| panic!("write failed: {err}"));
    }
    let mut cursor = zip.finish().unwrap_or_else(|err| panic!("finish failed: {err}"));
    cursor.set_position(0);
    cursor
}

#[test]
fn archives_without_hashes_get_them_recomputed() {
    let metadata = r#"{
        "appVersion": 2,
        "backupDate": 1600000000000,
        "packages": [{
            "identifier": "0f8fad5b-d9cb-469f-a165-70867728950e",
            "name": "Old",
            "author": "Bo",
            "trayImageFile": "old.webp",
            "stickers": [
                { "imageFile": "old.webp", "emojis": ["😀"] },
                { "imageFile": "trusted.webp", "imageFileHash": "stored-hash", "emojis": ["😂"] },
                { "imageFile": "gone.webp", "emojis": ["😢"], "width": 96, "height": 96 }
            ]
        }]
    }"#;
    let old_bytes: &[u8] = b"old image bytes";
    let archive = hand_built_archive(
        Some(metadata),
        &[("old.webp", old_bytes), ("trusted.webp", b"trusted bytes")],
    );

    let dir = TempDir::new().unwrap_or_else(|err| panic!("failed to create temp dir: {err}"));
    let mut target = side(dir.path(), "target");
    let selected = BTreeSet::from(["0f8fad5b-d9cb-469f-a165-70867728950e".to_string()]);
    restore_backup(&mut target.store, &target.assets, archive, &selected)
        .unwrap_or_else(|err| panic!("restore failed: {err}"));

    let restored = target
        .store
        .get_package_by_identifier("0f8fad5b-d9cb-469f-a165-70867728950e")
        .unwrap_or_else(|err| panic!("load failed: {err}"))
        .unwrap_or_else(|| panic!("restored package missing"));
    assert!(!restored.package.animated);
    assert_eq!(restored.stickers[0].image_file_hash, hash_bytes(old_bytes));
    assert_eq!(restored.stickers[0].width, CANVAS_SIZE);
    assert_eq!(restored.stickers[1].image_file_hash, "stored-hash");
    assert_eq!(restored.stickers[2].image_file_hash, "");
    assert_eq!(restored.stickers[2].width, 96);
}

#[test]
fn malformed_archives_are_reported() {
    let no_metadata = hand_built_archive(None, &[("a.webp", b"bytes")]);
    assert!(matches!(inspect_backup(no_metadata), Err(PacksmithError::MalformedArchive(_))));

    let bad_json = hand_built_archive(Some("{ not json"), &[]);
    assert!(matches!(inspect_backup(bad_json), Err(PacksmithError::MalformedArchive(_))));

    let dir = TempDir::new().unwrap_or_else(|err| panic!("failed to create temp dir: {err}"));
    let mut target = side(dir.path(), "target");
    let result = restore_backup(
        &mut target.store,
        &target.assets,
        hand_built_archive(Some("[]"), &[]),
        &BTreeSet::new(),
    );
    assert!(matches!(result, Err(PacksmithError::MalformedArchive(_))));
    assert!(target.store.list_packages().unwrap_or_default().is_empty());
}

#[test]
fn restore_never_overwrites_local_files() {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("failed to create temp dir: {err}"));
    let mut target = side(dir.path(), "target");
    let local_pack = NewPackage::new("Local", "Ana");
    let local_id =
        target.store.create_package(&local_pack).unwrap_or_else(|err| panic!("create failed: {err}"));
    target
        .assets
        .write_atomic("a.webp", &mut &b"LOCAL"[..])
        .unwrap_or_else(|err| panic!("write failed: {err}"));
    target
        .assets
        .write_atomic("same.webp", &mut &b"SAME"[..])
        .unwrap_or_else(|err| panic!("write failed: {err}"));
    let mut sticker = NewSticker::new(local_id, "a.webp", vec!["😀".to_string()]);
    sticker.image_file_hash = target.assets.hash("a.webp");
    target.store.add_sticker(&sticker).unwrap_or_else(|err| panic!("sticker failed: {err}"));

    let metadata = r#"{
        "appVersion": 1,
        "backupDate": 1700000000000,
        "packages": [{
            "identifier": "6a2f41a3-c54c-4b7a-9d8e-2f1f4e5a6b7c",
            "name": "Remote",
            "author": "Bo",
            "trayImageFile": "fresh.webp",
            "stickers": [
                { "imageFile": "a.webp", "emojis": ["😂"] },
                { "imageFile": "same.webp", "emojis": ["😢"] },
                { "imageFile": "fresh.webp", "emojis": ["🐱"] }
            ]
        }]
    }"#;
    let archive = hand_built_archive(
        Some(metadata),
        &[("a.webp", b"REMOTE"), ("same.webp", b"SAME"), ("fresh.webp", b"FRESH")],
    );
    let selected = BTreeSet::from(["6a2f41a3-c54c-4b7a-9d8e-2f1f4e5a6b7c".to_string()]);
    let summary = restore_backup(&mut target.store, &target.assets, archive, &selected)
        .unwrap_or_else(|err| panic!("restore failed: {err}"));

    assert_eq!(summary.packages_restored, 1);
    assert_eq!(summary.files_extracted, 1);
    assert_eq!(summary.file_conflicts, vec!["a.webp".to_string()]);

    let read = |name: &str| {
        std::fs::read(target.assets.root().join(name))
            .unwrap_or_else(|err| panic!("failed to read {name}: {err}"))
    };
    assert_eq!(read("a.webp"), b"LOCAL");
    assert_eq!(read("same.webp"), b"SAME");
    assert_eq!(read("fresh.webp"), b"FRESH");

    let local = target
        .store
        .get_package(local_id)
        .unwrap_or_else(|err| panic!("load failed: {err}"))
        .unwrap_or_else(|| panic!("local package missing"));
    assert_eq!(local.stickers[0].image_file_hash, target.assets.hash("a.webp"));
}

#[test]
fn failed_package_keeps_earlier_packages_committed() {
    let metadata = r#"{
        "appVersion": 1,
        "backupDate": 1700000000000,
        "packages": [
            {
                "identifier": "11111111-1111-4111-8111-111111111111",
                "name": "First",
                "author": "Ana",
                "trayImageFile": "first.webp",
                "stickers": [{ "imageFile": "first.webp", "emojis": ["😀"] }]
            },
            {
                "identifier": "22222222-2222-4222-8222-222222222222",
                "name": "Second",
                "author": "Ana",
                "trayImageFile": "second.webp",
                "stickers": [
                    { "imageFile": "second.webp", "emojis": ["😂"] },
                    { "imageFile": "broken.webp", "emojis": [] }
                ]
            }
        ]
    }"#;
    let archive = hand_built_archive(
        Some(metadata),
        &[("first.webp", b"first"), ("second.webp", b"second"), ("broken.webp", b"broken")],
    );

    let dir = TempDir::new().unwrap_or_else(|err| panic!("failed to create temp dir: {err}"));
    let mut target = side(dir.path(), "target");
    let selected = BTreeSet::from([
        "11111111-1111-4111-8111-111111111111".to_string(),
        "22222222-2222-4222-8222-222222222222".to_string(),
    ]);
    let result = restore_backup(&mut target.store, &target.assets, archive, &selected);
    assert!(matches!(result, Err(PacksmithError::ConstraintViolation(_))));

    let identifiers = target.store.package_identifiers().unwrap_or_default();
    assert_eq!(identifiers, BTreeSet::from(["11111111-1111-4111-8111-111111111111".to_string()]));
    assert!(target
        .store
        .get_package_by_identifier("22222222-2222-4222-8222-222222222222")
        .unwrap_or_else(|err| panic!("load failed: {err}"))
        .is_none());
}
