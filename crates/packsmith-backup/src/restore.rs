use std::collections::BTreeSet;
use std::io::{Read, Seek};

use packsmith_core::{hash_bytes, validate_asset_name, AssetDir, NewSticker, Result, CANVAS_SIZE};
use packsmith_store_sqlite::SqliteStore;
use serde::{Deserialize, Serialize};
use zip::ZipArchive;

use crate::archive::{read_document, read_zip_error, referenced_file_set, PackageDto, ASSET_PREFIX};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestoreSummary {
    pub packages_restored: usize,
    pub stickers_restored: usize,
    pub files_extracted: usize,
    /// Requested identifiers that already existed locally.
    pub skipped_existing: Vec<String>,
    /// Archived files whose name is taken locally by different bytes. The
    /// local file is kept.
    #[serde(default)]
    pub file_conflicts: Vec<String>,
}

/// Import the packages named in `selected` from `source`.
///
/// Each package commits on its own; a failure leaves earlier packages in
/// place. Identifiers already present locally are skipped and reported.
/// Local asset files are never overwritten: an archived file with the same
/// name and bytes is reused, one with different bytes is reported as a
/// conflict and left out.
///
/// # Errors
/// Returns `MalformedArchive` for an unreadable archive, `Security` for an
/// asset entry whose name could escape the asset directory, and store errors
/// from the package being imported when the failure happened.
pub fn restore_backup<R: Read + Seek>(
    store: &mut SqliteStore,
    assets: &AssetDir,
    source: R,
    selected: &BTreeSet<String>,
) -> Result<RestoreSummary> {
    let mut archive = ZipArchive::new(source).map_err(read_zip_error)?;
    let document = read_document(&mut archive)?;
    let local = store.package_identifiers()?;

    let mut summary = RestoreSummary::default();
    let mut wanted_packages: Vec<&PackageDto> = Vec::new();
    for package in document.packages.iter().filter(|package| selected.contains(&package.identifier)) {
        if local.contains(&package.identifier) {
            tracing::info!(identifier = package.identifier, "package exists locally, not restored");
            summary.skipped_existing.push(package.identifier.clone());
        } else {
            wanted_packages.push(package);
        }
    }

    let wanted_files = referenced_file_set(wanted_packages.iter().copied());
    extract_assets(&mut archive, assets, &wanted_files, &mut summary)?;

    for package in wanted_packages {
        let stickers = package
            .stickers
            .iter()
            .map(|dto| {
                let hash = match dto.image_file_hash.as_deref() {
                    Some(hash) if !hash.is_empty() => hash.to_string(),
                    _ if assets.exists(&dto.image_file) => assets.hash(&dto.image_file),
                    _ => String::new(),
                };
                NewSticker {
                    package_id: 0,
                    image_file: dto.image_file.clone(),
                    image_file_hash: hash,
                    emojis: dto.emojis.clone(),
                    width: dto.width.unwrap_or(CANVAS_SIZE),
                    height: dto.height.unwrap_or(CANVAS_SIZE),
                    size_in_kb: assets.size_in_kb(&dto.image_file),
                }
            })
            .collect::<Vec<_>>();

        let package_id = store.import_package(&package.to_new_package(), &stickers)?;
        tracing::info!(
            identifier = package.identifier,
            package_id,
            stickers = stickers.len(),
            "package restored"
        );
        summary.packages_restored += 1;
        summary.stickers_restored += stickers.len();
    }

    Ok(summary)
}

fn extract_assets<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    assets: &AssetDir,
    wanted: &BTreeSet<String>,
    summary: &mut RestoreSummary,
) -> Result<()> {
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(read_zip_error)?;
        if !entry.is_file() {
            continue;
        }
        let Some(file_name) = entry.name().strip_prefix(ASSET_PREFIX).map(str::to_string) else {
            continue;
        };
        if !wanted.contains(&file_name) {
            continue;
        }
        validate_asset_name(&file_name)?;

        if !assets.exists(&file_name) {
            assets.write_atomic(&file_name, &mut entry)?;
            summary.files_extracted += 1;
            continue;
        }

        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        let local_hash = assets.hash(&file_name);
        if !local_hash.is_empty() && local_hash == hash_bytes(&bytes) {
            tracing::debug!(file_name, "identical file already present, reused");
        } else {
            tracing::warn!(file_name, "local file differs from archived copy, kept local");
            summary.file_conflicts.push(file_name);
        }
    }
    Ok(())
}
