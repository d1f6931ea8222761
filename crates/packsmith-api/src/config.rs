use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Build number written into every archive's `appVersion`.
pub const APP_VERSION_CODE: i64 = 1;

pub const DB_FILE_NAME: &str = "packsmith.sqlite3";
pub const FILES_DIR_NAME: &str = "files";
pub const DATA_DIR_NAME: &str = "packsmith";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PacksmithConfig {
    pub db_path: PathBuf,
    pub files_dir: PathBuf,
    pub app_version: i64,
}

impl PacksmithConfig {
    /// Database and asset directory side by side under `data_dir`.
    #[must_use]
    pub fn from_data_dir(data_dir: &Path) -> Self {
        Self {
            db_path: data_dir.join(DB_FILE_NAME),
            files_dir: data_dir.join(FILES_DIR_NAME),
            app_version: APP_VERSION_CODE,
        }
    }

    /// Platform data directory, or the working directory when the platform has none.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join(DATA_DIR_NAME)
    }

    /// Explicit paths win; anything left unset falls back to the default data directory.
    #[must_use]
    pub fn resolve(db_path: Option<PathBuf>, files_dir: Option<PathBuf>) -> Self {
        let defaults = Self::default();
        Self {
            db_path: db_path.unwrap_or(defaults.db_path),
            files_dir: files_dir.unwrap_or(defaults.files_dir),
            app_version: defaults.app_version,
        }
    }
}

impl Default for PacksmithConfig {
    fn default() -> Self {
        Self::from_data_dir(&Self::default_data_dir())
    }
}
