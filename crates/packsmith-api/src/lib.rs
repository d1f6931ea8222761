//! Application facade over the content store, asset directory, and backup codec.
//!
//! Every write runs under one process-wide lock and publishes a fresh
//! package snapshot before the lock is released, so subscribers observe
//! snapshots in write order.

mod config;

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use packsmith_backup::{BackupDocument, ExportSummary, RestorePlan, RestoreSummary};
use packsmith_core::{
    normalize_emojis, validate_asset_name, AssetDir, NewPackage, NewSticker, NoWhitelist, Package,
    PackageWithStickers, PacksmithError, Result, Sticker, WhitelistRegistry, CANVAS_SIZE,
    MAX_STICKERS_PER_PACK,
};
use packsmith_provider::{is_exposed, PackQueryService};
use packsmith_store_sqlite::{IntegrityReport, SchemaStatus, SqliteStore};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

pub use config::{PacksmithConfig, APP_VERSION_CODE, DATA_DIR_NAME, DB_FILE_NAME, FILES_DIR_NAME};

pub const API_CONTRACT_VERSION: &str = "api.v1";

/// Every package with its stickers, as of one write.
pub type PackSnapshot = Arc<Vec<PackageWithStickers>>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrateResult {
    pub dry_run: bool,
    pub current_version: i64,
    pub target_version: i64,
    pub would_apply_versions: Vec<i64>,
    pub after_version: Option<i64>,
    pub up_to_date: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatePackageRequest {
    pub name: String,
    pub author: String,
    #[serde(default)]
    pub publisher_email: String,
    #[serde(default)]
    pub publisher_website: String,
    #[serde(default)]
    pub privacy_policy_website: String,
    #[serde(default)]
    pub license_agreement_website: String,
    #[serde(default)]
    pub animated: bool,
}

/// Fields left `None` keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateMetadataRequest {
    pub name: Option<String>,
    pub author: Option<String>,
    pub publisher_email: Option<String>,
    pub publisher_website: Option<String>,
    pub privacy_policy_website: Option<String>,
    pub license_agreement_website: Option<String>,
    pub animated: Option<bool>,
}

/// A finished image already written to the asset directory by the editor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddStickerRequest {
    pub identifier: String,
    pub image_file: String,
    pub emojis: Vec<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    Added { sticker: Sticker, package: Package },
    Duplicate { existing: Sticker },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageListing {
    #[serde(flatten)]
    pub package: Package,
    pub sticker_count: usize,
    pub whitelisted: bool,
    pub exposed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanupReport {
    pub dry_run: bool,
    pub removed: Vec<String>,
    pub kept: usize,
}

#[derive(Clone)]
pub struct PacksmithApi {
    config: PacksmithConfig,
    assets: AssetDir,
    whitelist: Arc<dyn WhitelistRegistry>,
    write_lock: Arc<Mutex<()>>,
    snapshots: Arc<watch::Sender<PackSnapshot>>,
}

impl PacksmithApi {
    #[must_use]
    pub fn new(config: PacksmithConfig) -> Self {
        let (snapshots, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            assets: AssetDir::new(config.files_dir.clone()),
            config,
            whitelist: Arc::new(NoWhitelist),
            write_lock: Arc::new(Mutex::new(())),
            snapshots: Arc::new(snapshots),
        }
    }

    #[must_use]
    pub fn with_whitelist(mut self, whitelist: Arc<dyn WhitelistRegistry>) -> Self {
        self.whitelist = whitelist;
        self
    }

    #[must_use]
    pub fn config(&self) -> &PacksmithConfig {
        &self.config
    }

    #[must_use]
    pub fn assets(&self) -> &AssetDir {
        &self.assets
    }

    fn open_unmigrated(&self) -> Result<SqliteStore> {
        if let Some(parent) = self.config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(SqliteStore::open(&self.config.db_path)?.with_whitelist(Arc::clone(&self.whitelist)))
    }

    fn open_store(&self) -> Result<SqliteStore> {
        let mut store = self.open_unmigrated()?;
        store.migrate()?;
        Ok(store)
    }

    fn publish(&self, store: &SqliteStore) {
        match store.list_packages_with_stickers() {
            Ok(packages) => {
                self.snapshots.send_replace(Arc::new(packages));
            }
            Err(err) => tracing::warn!(error = %err, "failed to refresh package snapshot"),
        }
    }

    /// Run a blocking facade call on tokio's blocking pool.
    ///
    /// # Errors
    /// Returns the call's own error, or `Internal` when the blocking task panicked.
    pub async fn run<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&PacksmithApi) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let api = self.clone();
        tokio::task::spawn_blocking(move || op(&api))
            .await
            .map_err(|err| PacksmithError::Internal(format!("blocking task failed: {err}")))?
    }

    /// Live view of the package list. The receiver starts at the current state.
    ///
    /// # Errors
    /// Returns an error when the initial snapshot cannot be read.
    pub fn subscribe(&self) -> Result<watch::Receiver<PackSnapshot>> {
        let _guard = self.write_lock.lock();
        let store = self.open_store()?;
        let packages = store.list_packages_with_stickers()?;
        self.snapshots.send_replace(Arc::new(packages));
        Ok(self.snapshots.subscribe())
    }

    /// # Errors
    /// Returns an error when the database cannot be opened or queried.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.open_unmigrated()?.schema_status()
    }

    /// Apply pending migrations, or report them in dry-run mode.
    ///
    /// # Errors
    /// Returns an error when migration planning or execution fails.
    pub fn migrate(&self, dry_run: bool) -> Result<MigrateResult> {
        let _guard = self.write_lock.lock();
        let mut store = self.open_unmigrated()?;
        let before = store.schema_status()?;
        if dry_run {
            return Ok(MigrateResult {
                dry_run: true,
                current_version: before.current_version,
                target_version: before.target_version,
                would_apply_versions: before.pending_versions,
                after_version: None,
                up_to_date: None,
            });
        }

        store.migrate()?;
        let after = store.schema_status()?;
        Ok(MigrateResult {
            dry_run: false,
            current_version: before.current_version,
            target_version: before.target_version,
            would_apply_versions: before.pending_versions,
            after_version: Some(after.current_version),
            up_to_date: Some(after.pending_versions.is_empty()),
        })
    }

    /// # Errors
    /// Returns an error when any integrity probe fails to run.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        self.open_store()?.integrity_check()
    }

    /// Create an empty pack with a fresh UUID identifier.
    ///
    /// # Errors
    /// Returns `ConstraintViolation` for a blank name or author.
    pub fn create_package(&self, request: CreatePackageRequest) -> Result<PackageWithStickers> {
        let mut package = NewPackage::new(request.name.trim(), request.author.trim());
        package.publisher_email = request.publisher_email;
        package.publisher_website = request.publisher_website;
        package.privacy_policy_website = request.privacy_policy_website;
        package.license_agreement_website = request.license_agreement_website;
        package.animated = request.animated;
        package.validate()?;

        let _guard = self.write_lock.lock();
        let mut store = self.open_store()?;
        let id = store.create_package(&package)?;
        let created = store
            .get_package(id)?
            .ok_or_else(|| PacksmithError::Internal(format!("package {id} vanished after insert")))?;
        self.publish(&store);
        tracing::info!(identifier = created.package.identifier, "package created");
        Ok(created)
    }

    /// Edit descriptive fields. The identifier and image data version stay as they are.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown identifier and `ConstraintViolation`
    /// when the name or author would become blank.
    pub fn update_package_metadata(
        &self,
        identifier: &str,
        request: UpdateMetadataRequest,
    ) -> Result<Package> {
        let _guard = self.write_lock.lock();
        let mut store = self.open_store()?;
        let mut package = load_package(&store, identifier)?.package;

        if let Some(name) = request.name {
            package.name = name.trim().to_string();
        }
        if let Some(author) = request.author {
            package.author = author.trim().to_string();
        }
        if let Some(value) = request.publisher_email {
            package.publisher_email = value;
        }
        if let Some(value) = request.publisher_website {
            package.publisher_website = value;
        }
        if let Some(value) = request.privacy_policy_website {
            package.privacy_policy_website = value;
        }
        if let Some(value) = request.license_agreement_website {
            package.license_agreement_website = value;
        }
        if let Some(animated) = request.animated {
            package.animated = animated;
        }
        if package.name.is_empty() || package.author.is_empty() {
            return Err(PacksmithError::ConstraintViolation(
                "package name and author must not be empty".to_string(),
            ));
        }

        store.update_package(&package)?;
        self.publish(&store);
        Ok(package)
    }

    /// Use an existing asset file as the pack's tray icon.
    ///
    /// # Errors
    /// Returns `Security` for an invalid name, and `NotFound` when the pack or file is missing.
    pub fn set_tray_image(&self, identifier: &str, image_file: &str) -> Result<Package> {
        validate_asset_name(image_file)?;
        let _guard = self.write_lock.lock();
        let mut store = self.open_store()?;
        let mut package = load_package(&store, identifier)?.package;
        if !self.assets.exists(image_file) {
            return Err(PacksmithError::NotFound(format!("image file {image_file}")));
        }

        package.tray_image_file = image_file.to_string();
        package.image_data_version = package.next_image_data_version();
        store.update_package(&package)?;
        self.publish(&store);
        Ok(package)
    }

    /// Register an image file as a sticker of a pack.
    ///
    /// A file whose content hash matches a sticker already in the pack is
    /// reported as a duplicate and nothing is written. The first sticker of a
    /// pack without a tray icon becomes its tray icon. Every accepted sticker
    /// bumps the pack's image data version.
    ///
    /// # Errors
    /// Returns `NotFound` when the pack or file is missing, `Security` for an
    /// invalid file name, and `ConstraintViolation` when the pack is full or
    /// no emoji is given.
    pub fn add_sticker(&self, request: AddStickerRequest) -> Result<IngestOutcome> {
        validate_asset_name(&request.image_file)?;
        let emojis = normalize_emojis(&request.emojis);

        let _guard = self.write_lock.lock();
        let mut store = self.open_store()?;
        let joined = load_package(&store, &request.identifier)?;

        if !self.assets.exists(&request.image_file) {
            return Err(PacksmithError::NotFound(format!("image file {}", request.image_file)));
        }
        let hash = self.assets.hash(&request.image_file);
        if let Some(existing) = joined.stickers.iter().find(|sticker| {
            sticker.image_file == request.image_file
                || (!hash.is_empty() && sticker.image_file_hash == hash)
        }) {
            tracing::info!(
                identifier = request.identifier,
                image_file = request.image_file,
                existing = existing.image_file,
                "duplicate sticker ignored"
            );
            return Ok(IngestOutcome::Duplicate { existing: existing.clone() });
        }
        if joined.stickers.len() >= MAX_STICKERS_PER_PACK {
            return Err(PacksmithError::ConstraintViolation(format!(
                "pack {} already holds {MAX_STICKERS_PER_PACK} stickers",
                request.identifier
            )));
        }

        let mut package = joined.package;
        if !package.has_tray_image() {
            package.tray_image_file.clone_from(&request.image_file);
        }
        package.image_data_version = package.next_image_data_version();

        let size_in_kb = self.assets.size_in_kb(&request.image_file);
        let sticker = NewSticker {
            package_id: package.id,
            image_file: request.image_file,
            image_file_hash: hash,
            emojis,
            width: request.width.unwrap_or(CANVAS_SIZE),
            height: request.height.unwrap_or(CANVAS_SIZE),
            size_in_kb,
        };

        let sticker_id = store.add_sticker_to_package(&sticker, &package)?;
        let stored = store
            .get_sticker(sticker_id)?
            .ok_or_else(|| PacksmithError::Internal(format!("sticker {sticker_id} vanished after insert")))?;
        self.publish(&store);
        Ok(IngestOutcome::Added { sticker: stored, package })
    }

    /// Remove one sticker row and bump its pack's image data version. The file stays.
    ///
    /// # Errors
    /// Returns an error when the store cannot be written.
    pub fn delete_sticker(&self, sticker_id: i64) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let mut store = self.open_store()?;
        let Some(sticker) = store.get_sticker(sticker_id)? else {
            tracing::debug!(sticker_id, "sticker not found");
            return Ok(false);
        };
        let Some(joined) = store.get_package(sticker.package_id)? else {
            return Ok(false);
        };

        let mut package = joined.package;
        package.image_data_version = package.next_image_data_version();
        let removed = store.remove_sticker_from_package(sticker_id, &package)?;
        self.publish(&store);
        Ok(removed)
    }

    /// Delete a pack and all of its stickers. Files stay until the next cleanup.
    ///
    /// # Errors
    /// Returns an error when the store cannot be written.
    pub fn delete_package(&self, identifier: &str) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let mut store = self.open_store()?;
        let Some(joined) = store.get_package_by_identifier(identifier)? else {
            tracing::debug!(identifier, "package not found");
            return Ok(false);
        };
        let deleted = store.delete_package(joined.package.id)?;
        self.publish(&store);
        Ok(deleted)
    }

    /// # Errors
    /// Returns an error when the store cannot be read.
    pub fn get_package(&self, identifier: &str) -> Result<Option<PackageWithStickers>> {
        self.open_store()?.get_package_by_identifier(identifier)
    }

    /// Every pack with its sticker count, whitelist flag, and exposure state.
    ///
    /// # Errors
    /// Returns an error when the store cannot be read.
    pub fn list_packages(&self) -> Result<Vec<PackageListing>> {
        let store = self.open_store()?;
        Ok(store
            .list_packages_with_stickers()?
            .into_iter()
            .map(|joined| PackageListing {
                sticker_count: joined.stickers.len(),
                whitelisted: store.is_whitelisted(&joined.package.identifier),
                exposed: is_exposed(&joined, &self.assets),
                package: joined.package,
            })
            .collect())
    }

    #[must_use]
    pub fn is_whitelisted(&self, identifier: &str) -> bool {
        self.whitelist.is_whitelisted(identifier)
    }

    /// Delete every asset file no pack or sticker references.
    ///
    /// # Errors
    /// Returns an error when the store or directory cannot be read. Individual
    /// delete failures are logged and the file is counted as kept.
    pub fn cleanup_orphan_files(&self, dry_run: bool) -> Result<CleanupReport> {
        let _guard = self.write_lock.lock();
        let store = self.open_store()?;
        let referenced = store.referenced_file_names()?;

        let mut report = CleanupReport { dry_run, ..CleanupReport::default() };
        for name in self.assets.list()? {
            if referenced.contains(&name) {
                report.kept += 1;
                continue;
            }
            if dry_run {
                report.removed.push(name);
                continue;
            }
            match self.assets.remove(&name) {
                Ok(_) => {
                    tracing::info!(file_name = name, "removed orphan file");
                    report.removed.push(name);
                }
                Err(err) => {
                    tracing::warn!(file_name = name, error = %err, "failed to remove orphan file");
                    report.kept += 1;
                }
            }
        }
        Ok(report)
    }

    /// # Errors
    /// Returns an error when the store cannot be read or the archive cannot be written.
    pub fn export_backup(&self, destination: &Path) -> Result<ExportSummary> {
        let store = self.open_store()?;
        let file = File::create(destination)?;
        packsmith_backup::export_backup(&store, &self.assets, self.config.app_version, file)
    }

    /// # Errors
    /// Returns `MalformedArchive` when the archive cannot be decoded.
    pub fn inspect_backup(&self, source: &Path) -> Result<BackupDocument> {
        packsmith_backup::inspect_backup(File::open(source)?)
    }

    /// Classify the archive's packages against the local store.
    ///
    /// # Errors
    /// Returns `MalformedArchive` when the archive cannot be decoded.
    pub fn plan_restore(&self, source: &Path) -> Result<RestorePlan> {
        let document = self.inspect_backup(source)?;
        let local = self.open_store()?.package_identifiers()?;
        Ok(RestorePlan::new(&document, &local))
    }

    /// # Errors
    /// Returns the first failure; packages restored before it stay committed.
    pub fn restore_backup(&self, source: &Path, selected: &BTreeSet<String>) -> Result<RestoreSummary> {
        let _guard = self.write_lock.lock();
        let mut store = self.open_store()?;
        let result = packsmith_backup::restore_backup(&mut store, &self.assets, File::open(source)?, selected);
        self.publish(&store);
        result
    }

    /// Query surface over the same database and asset directory.
    ///
    /// # Errors
    /// Returns an error when the database cannot be prepared or workers cannot start.
    pub fn query_service(&self) -> Result<PackQueryService> {
        drop(self.open_store()?);
        PackQueryService::new(self.config.db_path.clone(), self.assets.clone())
    }
}

fn load_package(store: &SqliteStore, identifier: &str) -> Result<PackageWithStickers> {
    store
        .get_package_by_identifier(identifier)?
        .ok_or_else(|| PacksmithError::NotFound(format!("package {identifier}")))
}
