use packsmith_core::{Package, Sticker};
use serde::{Deserialize, Serialize};

pub const STICKER_PACK_IDENTIFIER: &str = "sticker_pack_identifier";
pub const STICKER_PACK_NAME: &str = "sticker_pack_name";
pub const STICKER_PACK_PUBLISHER: &str = "sticker_pack_publisher";
pub const STICKER_PACK_ICON: &str = "sticker_pack_icon";
pub const ANDROID_APP_DOWNLOAD_LINK: &str = "android_play_store_link";
pub const IOS_APP_DOWNLOAD_LINK: &str = "ios_app_download_link";
pub const PUBLISHER_EMAIL: &str = "sticker_pack_publisher_email";
pub const PUBLISHER_WEBSITE: &str = "sticker_pack_publisher_website";
pub const PRIVACY_POLICY_WEBSITE: &str = "sticker_pack_privacy_policy_website";
pub const LICENSE_AGREEMENT_WEBSITE: &str = "sticker_pack_license_agreement_website";
pub const IMAGE_DATA_VERSION: &str = "image_data_version";
pub const AVOID_CACHE: &str = "whatsapp_will_not_cache_stickers";
pub const ANIMATED_STICKER_PACK: &str = "animated_sticker_pack";

pub const STICKER_FILE_NAME: &str = "sticker_file_name";
pub const STICKER_FILE_EMOJI: &str = "sticker_emoji";

/// Metadata columns, in wire order.
pub const METADATA_COLUMNS: [&str; 13] = [
    STICKER_PACK_IDENTIFIER,
    STICKER_PACK_NAME,
    STICKER_PACK_PUBLISHER,
    STICKER_PACK_ICON,
    ANDROID_APP_DOWNLOAD_LINK,
    IOS_APP_DOWNLOAD_LINK,
    PUBLISHER_EMAIL,
    PUBLISHER_WEBSITE,
    PRIVACY_POLICY_WEBSITE,
    LICENSE_AGREEMENT_WEBSITE,
    IMAGE_DATA_VERSION,
    AVOID_CACHE,
    ANIMATED_STICKER_PACK,
];

pub const STICKER_COLUMNS: [&str; 2] = [STICKER_FILE_NAME, STICKER_FILE_EMOJI];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CellValue {
    Integer(i64),
    Text(String),
}

impl CellValue {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            Self::Integer(_) => None,
        }
    }

    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Text(_) => None,
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// A cursor-shaped answer: fixed column names plus zero or more rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl QueryResult {
    #[must_use]
    pub fn empty(columns: &[&str]) -> Self {
        Self { columns: columns.iter().map(|column| (*column).to_string()).collect(), rows: Vec::new() }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Cell at `row` under the named column.
    #[must_use]
    pub fn value(&self, row: usize, column: &str) -> Option<&CellValue> {
        let index = self.columns.iter().position(|name| name == column)?;
        self.rows.get(row)?.get(index)
    }
}

pub(crate) fn metadata_row(package: &Package) -> Vec<CellValue> {
    vec![
        package.identifier.as_str().into(),
        package.name.as_str().into(),
        package.author.as_str().into(),
        package.tray_image_file.as_str().into(),
        "".into(),
        "".into(),
        package.publisher_email.as_str().into(),
        package.publisher_website.as_str().into(),
        package.privacy_policy_website.as_str().into(),
        package.license_agreement_website.as_str().into(),
        package.image_data_version.as_str().into(),
        "0".into(),
        CellValue::Integer(i64::from(package.animated)),
    ]
}

pub(crate) fn sticker_row(sticker: &Sticker) -> Vec<CellValue> {
    vec![sticker.image_file.as_str().into(), CellValue::Text(sticker.joined_emojis())]
}
