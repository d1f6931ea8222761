//! Read-only query surface handed to the external messaging app.
//!
//! Every call answers synchronously but executes on a [`QueryExecutor`]
//! worker. Storage faults, panics and timeouts are logged and turned into an
//! empty answer; the only error an external caller ever sees is a rejected
//! asset name.

mod executor;
mod route;
mod schema;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use packsmith_core::{
    mime_type_for, validate_asset_name, AssetDir, PackageWithStickers, PacksmithError, Result,
};
use packsmith_store_sqlite::SqliteStore;

pub use executor::{ExecutorError, QueryExecutor, DEFAULT_WORKERS, QUERY_TIMEOUT};
pub use route::{
    QueryRoute, DEFAULT_AUTHORITY, METADATA_PATH, STICKERS_ASSET_PATH, STICKERS_PATH,
};
pub use schema::{
    CellValue, QueryResult, ANIMATED_STICKER_PACK, AVOID_CACHE, IMAGE_DATA_VERSION,
    METADATA_COLUMNS, STICKER_COLUMNS, STICKER_FILE_EMOJI, STICKER_FILE_NAME, STICKER_PACK_ICON,
    STICKER_PACK_IDENTIFIER, STICKER_PACK_NAME, STICKER_PACK_PUBLISHER,
};

/// An opened sticker asset.
#[derive(Debug)]
pub struct AssetHandle {
    pub file: File,
    pub file_name: String,
    pub mime_type: &'static str,
}

pub struct PackQueryService {
    db_path: PathBuf,
    assets: AssetDir,
    authority: String,
    executor: QueryExecutor,
}

impl PackQueryService {
    /// # Errors
    /// Returns `Io` when the worker threads cannot be spawned.
    pub fn new(db_path: impl Into<PathBuf>, assets: AssetDir) -> Result<Self> {
        Self::with_options(db_path, assets, DEFAULT_AUTHORITY, DEFAULT_WORKERS, QUERY_TIMEOUT)
    }

    /// # Errors
    /// Returns `Io` when the worker threads cannot be spawned.
    pub fn with_options(
        db_path: impl Into<PathBuf>,
        assets: AssetDir,
        authority: impl Into<String>,
        workers: usize,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            db_path: db_path.into(),
            assets,
            authority: authority.into(),
            executor: QueryExecutor::new(workers, timeout)?,
        })
    }

    #[must_use]
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Answer a metadata or stickers query. Never fails: unknown URIs and
    /// internal faults produce an empty result.
    #[must_use]
    pub fn query(&self, uri: &str) -> QueryResult {
        let Some(route) = QueryRoute::parse(uri, &self.authority) else {
            tracing::warn!(uri, "unknown provider uri");
            return QueryResult::empty(&[]);
        };
        let columns: &[&str] = match route {
            QueryRoute::Metadata | QueryRoute::MetadataById(_) => &METADATA_COLUMNS,
            QueryRoute::Stickers(_) => &STICKER_COLUMNS,
            QueryRoute::StickerAsset { .. } => {
                tracing::warn!(uri, "asset uri passed to query");
                return QueryResult::empty(&[]);
            }
        };

        let db_path = self.db_path.clone();
        let assets = self.assets.clone();
        let job_route = route.clone();
        match self.executor.run(move || execute_query(&db_path, &assets, &job_route)) {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                tracing::error!(uri, category = err.category(), error = %err, "provider query failed");
                QueryResult::empty(columns)
            }
            Err(err) => {
                tracing::error!(uri, error = %err, "provider query aborted");
                QueryResult::empty(columns)
            }
        }
    }

    /// Open a sticker or tray image of a known pack for reading.
    ///
    /// `Ok(None)` covers a missing file, an unknown pack, a file the pack does
    /// not reference, and any absorbed internal fault.
    ///
    /// # Errors
    /// Returns `Security` when the requested file name could escape the asset
    /// directory. No filesystem access is attempted in that case.
    pub fn open_asset(&self, uri: &str) -> Result<Option<AssetHandle>> {
        let Some(QueryRoute::StickerAsset { identifier, file_name }) =
            QueryRoute::parse(uri, &self.authority)
        else {
            tracing::debug!(uri, "not an asset uri");
            return Ok(None);
        };
        validate_asset_name(&file_name)?;

        let db_path = self.db_path.clone();
        let assets = self.assets.clone();
        let name = file_name.clone();
        let outcome = self.executor.run(move || open_pack_asset(&db_path, &assets, &identifier, &name));

        match outcome {
            Ok(Ok(Some(file))) => {
                let mime_type = mime_type_for(&file_name);
                Ok(Some(AssetHandle { file, file_name, mime_type }))
            }
            Ok(Ok(None)) => {
                tracing::debug!(file_name, "asset not found");
                Ok(None)
            }
            Ok(Err(err @ PacksmithError::Security(_))) => Err(err),
            Ok(Err(err)) => {
                tracing::error!(file_name, category = err.category(), error = %err, "asset open failed");
                Ok(None)
            }
            Err(err) => {
                tracing::error!(file_name, error = %err, "asset open aborted");
                Ok(None)
            }
        }
    }

    /// Content type for a route, `None` for unknown URIs.
    #[must_use]
    pub fn get_type(&self, uri: &str) -> Option<String> {
        QueryRoute::parse(uri, &self.authority).map(|route| route.content_type(&self.authority))
    }

    /// The interface is read-only; inserts are ignored.
    #[must_use]
    pub fn insert(&self, uri: &str) -> Option<String> {
        tracing::debug!(uri, "ignored provider insert");
        None
    }

    #[must_use]
    pub fn update(&self, uri: &str) -> usize {
        tracing::debug!(uri, "ignored provider update");
        0
    }

    #[must_use]
    pub fn delete(&self, uri: &str) -> usize {
        tracing::debug!(uri, "ignored provider delete");
        0
    }
}

/// A pack is exposed only while it holds at least one sticker and its tray
/// icon exists on disk.
#[must_use]
pub fn is_exposed(joined: &PackageWithStickers, assets: &AssetDir) -> bool {
    !joined.stickers.is_empty()
        && joined.package.has_tray_image()
        && assets.exists(&joined.package.tray_image_file)
}

fn execute_query(db_path: &Path, assets: &AssetDir, route: &QueryRoute) -> Result<QueryResult> {
    let store = SqliteStore::open_read_only(db_path)?;
    match route {
        QueryRoute::Metadata => {
            let mut result = QueryResult::empty(&METADATA_COLUMNS);
            for joined in store.list_packages_with_stickers()? {
                if is_exposed(&joined, assets) {
                    result.rows.push(schema::metadata_row(&joined.package));
                } else {
                    tracing::debug!(identifier = joined.package.identifier, "pack hidden from caller");
                }
            }
            Ok(result)
        }
        QueryRoute::MetadataById(identifier) => {
            let mut result = QueryResult::empty(&METADATA_COLUMNS);
            match store.get_package_by_identifier(identifier)? {
                Some(joined) if is_exposed(&joined, assets) => {
                    result.rows.push(schema::metadata_row(&joined.package));
                }
                Some(_) => tracing::debug!(identifier, "pack hidden from caller"),
                None => tracing::debug!(identifier, "pack not found"),
            }
            Ok(result)
        }
        QueryRoute::Stickers(identifier) => {
            let mut result = QueryResult::empty(&STICKER_COLUMNS);
            let Some(joined) = store.get_package_by_identifier(identifier)? else {
                tracing::debug!(identifier, "pack not found");
                return Ok(result);
            };
            for sticker in &joined.stickers {
                if assets.exists(&sticker.image_file) {
                    result.rows.push(schema::sticker_row(sticker));
                } else {
                    tracing::debug!(file = sticker.image_file, "sticker file missing, skipped");
                }
            }
            Ok(result)
        }
        QueryRoute::StickerAsset { .. } => Ok(QueryResult::empty(&[])),
    }
}

fn open_pack_asset(
    db_path: &Path,
    assets: &AssetDir,
    identifier: &str,
    file_name: &str,
) -> Result<Option<File>> {
    let store = SqliteStore::open_read_only(db_path)?;
    let Some(joined) = store.get_package_by_identifier(identifier)? else {
        return Ok(None);
    };
    if !joined.referenced_files().contains(&file_name) {
        return Ok(None);
    }
    assets.open(file_name)
}
