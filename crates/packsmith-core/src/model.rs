use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assets::validate_asset_name;
use crate::error::{PacksmithError, Result};

/// Pixel size the editor normalizes every sticker to.
pub const CANVAS_SIZE: u32 = 512;

pub const INITIAL_IMAGE_DATA_VERSION: &str = "1";

/// Ceiling the consuming messaging app enforces for one pack.
pub const MAX_STICKERS_PER_PACK: usize = 30;

/// Length cap the editing UI applies to names and authors. The store accepts longer text.
pub const MAX_DISPLAY_TEXT_CHARS: usize = 128;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Package {
    pub id: i64,
    pub identifier: String,
    pub name: String,
    pub author: String,
    pub tray_image_file: String,
    pub image_data_version: String,
    pub publisher_email: String,
    pub publisher_website: String,
    pub privacy_policy_website: String,
    pub license_agreement_website: String,
    pub animated: bool,
}

impl Package {
    #[must_use]
    pub fn has_tray_image(&self) -> bool {
        !self.tray_image_file.is_empty()
    }

    /// Next value of `image_data_version`. Unparseable versions restart the sequence.
    #[must_use]
    pub fn next_image_data_version(&self) -> String {
        let current = self.image_data_version.trim().parse::<u64>().unwrap_or(0);
        current.saturating_add(1).to_string()
    }
}

/// A package that has not been persisted yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewPackage {
    pub identifier: String,
    pub name: String,
    pub author: String,
    pub tray_image_file: String,
    pub image_data_version: String,
    pub publisher_email: String,
    pub publisher_website: String,
    pub privacy_policy_website: String,
    pub license_agreement_website: String,
    pub animated: bool,
}

impl NewPackage {
    /// Fresh package with a newly minted UUID identifier and an empty tray.
    #[must_use]
    pub fn new(name: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            identifier: Uuid::new_v4().to_string(),
            name: name.into(),
            author: author.into(),
            tray_image_file: String::new(),
            image_data_version: INITIAL_IMAGE_DATA_VERSION.to_string(),
            publisher_email: String::new(),
            publisher_website: String::new(),
            privacy_policy_website: String::new(),
            license_agreement_website: String::new(),
            animated: false,
        }
    }

    /// Validate fields the store relies on.
    ///
    /// # Errors
    /// Returns `ConstraintViolation` for an empty identifier, name, or author, and
    /// `Security` when the tray file name is not a bare file name.
    pub fn validate(&self) -> Result<()> {
        if self.identifier.trim().is_empty() {
            return Err(PacksmithError::ConstraintViolation(
                "package identifier must not be empty".to_string(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(PacksmithError::ConstraintViolation(
                "package name must not be empty".to_string(),
            ));
        }
        if self.author.trim().is_empty() {
            return Err(PacksmithError::ConstraintViolation(
                "package author must not be empty".to_string(),
            ));
        }
        if !self.tray_image_file.is_empty() {
            validate_asset_name(&self.tray_image_file)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sticker {
    pub id: i64,
    pub package_id: i64,
    pub image_file: String,
    pub image_file_hash: String,
    pub emojis: Vec<String>,
    pub width: u32,
    pub height: u32,
    pub size_in_kb: u64,
}

impl Sticker {
    /// Emoji tags in the comma-joined form the query interface returns.
    #[must_use]
    pub fn joined_emojis(&self) -> String {
        self.emojis.join(",")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewSticker {
    pub package_id: i64,
    pub image_file: String,
    pub image_file_hash: String,
    pub emojis: Vec<String>,
    pub width: u32,
    pub height: u32,
    pub size_in_kb: u64,
}

impl NewSticker {
    #[must_use]
    pub fn new(package_id: i64, image_file: impl Into<String>, emojis: Vec<String>) -> Self {
        Self {
            package_id,
            image_file: image_file.into(),
            image_file_hash: String::new(),
            emojis,
            width: CANVAS_SIZE,
            height: CANVAS_SIZE,
            size_in_kb: 0,
        }
    }

    /// # Errors
    /// Returns `ConstraintViolation` when no emoji is tagged, and `Security` when
    /// the image file is not a bare file name.
    pub fn validate(&self) -> Result<()> {
        validate_asset_name(&self.image_file)?;
        if self.emojis.iter().all(|emoji| emoji.trim().is_empty()) {
            return Err(PacksmithError::ConstraintViolation(format!(
                "sticker {} must carry at least one emoji",
                self.image_file
            )));
        }
        Ok(())
    }
}

/// One package joined with all of its stickers, read from a single snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageWithStickers {
    #[serde(flatten)]
    pub package: Package,
    pub stickers: Vec<Sticker>,
}

impl PackageWithStickers {
    /// Every image file this package references: tray first, then stickers.
    #[must_use]
    pub fn referenced_files(&self) -> Vec<&str> {
        let mut files = Vec::with_capacity(self.stickers.len() + 1);
        if self.package.has_tray_image() {
            files.push(self.package.tray_image_file.as_str());
        }
        files.extend(self.stickers.iter().map(|sticker| sticker.image_file.as_str()));
        files
    }
}

/// Trim emoji tags, drop blanks and duplicates, keep first-seen order.
#[must_use]
pub fn normalize_emojis<I, S>(emojis: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for emoji in emojis {
        let trimmed = emoji.as_ref().trim();
        if trimmed.is_empty() || normalized.iter().any(|seen| seen == trimmed) {
            continue;
        }
        normalized.push(trimmed.to_string());
    }
    normalized
}
