//! Archive layout and the document stored inside it.

use std::collections::BTreeSet;
use std::io::{Read, Seek};

use packsmith_core::{
    NewPackage, PackageWithStickers, PacksmithError, Result, INITIAL_IMAGE_DATA_VERSION,
};
use serde::{Deserialize, Serialize};
use zip::result::ZipError;
use zip::ZipArchive;

/// Entry holding the metadata document.
pub const METADATA_ENTRY: &str = "metadata.json";

/// Prefix under which every image file is stored.
pub const ASSET_PREFIX: &str = "files/";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    pub app_version: i64,
    /// Milliseconds since the Unix epoch.
    pub backup_date: i64,
    pub packages: Vec<PackageDto>,
}

impl BackupDocument {
    #[must_use]
    pub fn package(&self, identifier: &str) -> Option<&PackageDto> {
        self.packages.iter().find(|package| package.identifier == identifier)
    }

    #[must_use]
    pub fn sticker_count(&self) -> usize {
        self.packages.iter().map(|package| package.stickers.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PackageDto {
    pub identifier: String,
    pub name: String,
    pub author: String,
    #[serde(default)]
    pub tray_image_file: String,
    #[serde(default = "initial_image_data_version")]
    pub image_data_version: String,
    #[serde(default)]
    pub publisher_email: String,
    #[serde(default)]
    pub publisher_website: String,
    #[serde(default)]
    pub privacy_policy_website: String,
    #[serde(default)]
    pub license_agreement_website: String,
    #[serde(default)]
    pub is_animated: bool,
    #[serde(default)]
    pub stickers: Vec<StickerDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StickerDto {
    pub image_file: String,
    #[serde(default)]
    pub image_file_hash: Option<String>,
    #[serde(default)]
    pub emojis: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

fn initial_image_data_version() -> String {
    INITIAL_IMAGE_DATA_VERSION.to_string()
}

impl From<&PackageWithStickers> for PackageDto {
    fn from(joined: &PackageWithStickers) -> Self {
        let package = &joined.package;
        Self {
            identifier: package.identifier.clone(),
            name: package.name.clone(),
            author: package.author.clone(),
            tray_image_file: package.tray_image_file.clone(),
            image_data_version: package.image_data_version.clone(),
            publisher_email: package.publisher_email.clone(),
            publisher_website: package.publisher_website.clone(),
            privacy_policy_website: package.privacy_policy_website.clone(),
            license_agreement_website: package.license_agreement_website.clone(),
            is_animated: package.animated,
            stickers: joined
                .stickers
                .iter()
                .map(|sticker| StickerDto {
                    image_file: sticker.image_file.clone(),
                    image_file_hash: Some(sticker.image_file_hash.clone())
                        .filter(|hash| !hash.is_empty()),
                    emojis: sticker.emojis.clone(),
                    width: Some(sticker.width),
                    height: Some(sticker.height),
                })
                .collect(),
        }
    }
}

impl PackageDto {
    /// The package row to create locally. The identifier is carried over unchanged.
    #[must_use]
    pub fn to_new_package(&self) -> NewPackage {
        NewPackage {
            identifier: self.identifier.clone(),
            name: self.name.clone(),
            author: self.author.clone(),
            tray_image_file: self.tray_image_file.clone(),
            image_data_version: self.image_data_version.clone(),
            publisher_email: self.publisher_email.clone(),
            publisher_website: self.publisher_website.clone(),
            privacy_policy_website: self.privacy_policy_website.clone(),
            license_agreement_website: self.license_agreement_website.clone(),
            animated: self.is_animated,
        }
    }

    /// Tray icon (if any) plus every sticker image.
    pub fn referenced_files(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.tray_image_file.as_str())
            .filter(|name| !name.is_empty())
            .chain(self.stickers.iter().map(|sticker| sticker.image_file.as_str()))
    }
}

/// Distinct file names referenced by `packages`.
pub fn referenced_file_set<'a>(packages: impl IntoIterator<Item = &'a PackageDto>) -> BTreeSet<String> {
    packages
        .into_iter()
        .flat_map(PackageDto::referenced_files)
        .map(str::to_string)
        .collect()
}

/// Entry name for an image file.
#[must_use]
pub fn asset_entry_name(file_name: &str) -> String {
    format!("{ASSET_PREFIX}{file_name}")
}

pub(crate) fn read_zip_error(err: ZipError) -> PacksmithError {
    PacksmithError::MalformedArchive(err.to_string())
}

pub(crate) fn write_zip_error(err: ZipError) -> PacksmithError {
    match err {
        ZipError::Io(io) => PacksmithError::Io(io),
        other => PacksmithError::Internal(format!("failed to write archive: {other}")),
    }
}

/// Read and decode the metadata entry without touching image entries.
pub(crate) fn read_document<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<BackupDocument> {
    let mut entry = match archive.by_name(METADATA_ENTRY) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => {
            return Err(PacksmithError::MalformedArchive(format!(
                "archive has no {METADATA_ENTRY} entry"
            )))
        }
        Err(err) => return Err(read_zip_error(err)),
    };
    let mut contents = String::new();
    entry
        .read_to_string(&mut contents)
        .map_err(|err| PacksmithError::MalformedArchive(format!("unreadable {METADATA_ENTRY}: {err}")))?;
    serde_json::from_str(&contents)
        .map_err(|err| PacksmithError::MalformedArchive(format!("invalid {METADATA_ENTRY}: {err}")))
}

/// Decode the metadata document of an archive.
///
/// # Errors
/// Returns `MalformedArchive` when the source is not a zip archive, has no
/// metadata entry, or the entry does not parse.
pub fn inspect_backup<R: Read + Seek>(source: R) -> Result<BackupDocument> {
    let mut archive = ZipArchive::new(source).map_err(read_zip_error)?;
    read_document(&mut archive)
}
