use std::collections::BTreeSet;
use std::io::{self, Seek, Write};

use packsmith_core::{AssetDir, PackageWithStickers, PacksmithError, Result};
use packsmith_store_sqlite::SqliteStore;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::archive::{asset_entry_name, write_zip_error, BackupDocument, PackageDto, METADATA_ENTRY};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportSummary {
    pub packages: usize,
    pub stickers: usize,
    pub files_written: usize,
    pub files_missing: Vec<String>,
    pub backup_date: i64,
}

/// Snapshot every package from `store` and write it, with its image files, to `sink`.
///
/// # Errors
/// Returns an error when the store cannot be read or the archive cannot be
/// written. Missing image files are skipped, never an error.
pub fn export_backup<W: Write + Seek>(
    store: &SqliteStore,
    assets: &AssetDir,
    app_version: i64,
    sink: W,
) -> Result<ExportSummary> {
    let packages = store.list_packages_with_stickers()?;
    write_archive(&packages, assets, app_version, sink)
}

/// Write `packages` as an archive: metadata entry first, then each distinct file once.
///
/// # Errors
/// Returns an error when the archive cannot be written.
pub fn write_archive<W: Write + Seek>(
    packages: &[PackageWithStickers],
    assets: &AssetDir,
    app_version: i64,
    sink: W,
) -> Result<ExportSummary> {
    let backup_date = epoch_millis_now();
    let document = BackupDocument {
        app_version,
        backup_date,
        packages: packages.iter().map(PackageDto::from).collect(),
    };

    let mut zip = ZipWriter::new(sink);
    let text_options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let image_options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    let metadata = serde_json::to_string_pretty(&document)
        .map_err(|err| PacksmithError::Internal(format!("failed to encode metadata: {err}")))?;
    zip.start_file(METADATA_ENTRY, text_options).map_err(write_zip_error)?;
    zip.write_all(metadata.as_bytes())?;

    let mut written = BTreeSet::new();
    let mut files_missing = Vec::new();
    for joined in packages {
        for file_name in joined.referenced_files() {
            if !written.insert(file_name.to_string()) {
                continue;
            }
            let Some(mut file) = open_for_export(assets, file_name) else {
                files_missing.push(file_name.to_string());
                continue;
            };
            zip.start_file(asset_entry_name(file_name), image_options).map_err(write_zip_error)?;
            io::copy(&mut file, &mut zip)?;
        }
    }

    zip.finish().map_err(write_zip_error)?;

    let summary = ExportSummary {
        packages: document.packages.len(),
        stickers: document.sticker_count(),
        files_written: written.len() - files_missing.len(),
        files_missing,
        backup_date,
    };
    tracing::info!(
        packages = summary.packages,
        stickers = summary.stickers,
        files = summary.files_written,
        missing = summary.files_missing.len(),
        "backup exported"
    );
    Ok(summary)
}

fn open_for_export(assets: &AssetDir, file_name: &str) -> Option<std::fs::File> {
    match assets.open(file_name) {
        Ok(Some(file)) => Some(file),
        Ok(None) => {
            tracing::warn!(file_name, "referenced file missing, skipped from backup");
            None
        }
        Err(err) => {
            tracing::warn!(file_name, error = %err, "referenced file unreadable, skipped from backup");
            None
        }
    }
}

fn epoch_millis_now() -> i64 {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(millis).unwrap_or(i64::MAX)
}
