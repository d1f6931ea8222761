//! The asset directory: the only place sticker images live on disk.
//!
//! Every file is addressed by a bare name. Names that arrive from outside the
//! process go through [`validate_asset_name`] before any filesystem access.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{PacksmithError, Result};
use crate::integrity::hash_file;

pub const STICKER_EXTENSION: &str = "webp";
pub const STICKER_MIME_TYPE: &str = "image/webp";
pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

const PARTIAL_SUFFIX: &str = ".partial";

/// Reject names that could escape the asset directory.
///
/// # Errors
/// Returns `Security` for empty names, `..` sequences, and directory separators.
pub fn validate_asset_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PacksmithError::Security("empty file name".to_string()));
    }
    if name.contains("..") {
        return Err(PacksmithError::Security(format!("path traversal in file name: {name}")));
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(PacksmithError::Security(format!("directory separator in file name: {name}")));
    }
    Ok(())
}

/// MIME type derived from the file extension alone.
#[must_use]
pub fn mime_type_for(name: &str) -> &'static str {
    match Path::new(name).extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case(STICKER_EXTENSION) => STICKER_MIME_TYPE,
        _ => FALLBACK_MIME_TYPE,
    }
}

#[derive(Debug, Clone)]
pub struct AssetDir {
    root: PathBuf,
}

impl AssetDir {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open the directory, creating it when missing.
    ///
    /// # Errors
    /// Returns `Io` when the directory cannot be created.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let dir = Self::new(root);
        fs::create_dir_all(&dir.root)?;
        Ok(dir)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// # Errors
    /// Returns `Security` when `name` is not a bare file name.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_asset_name(name)?;
        Ok(self.root.join(name))
    }

    /// Whether a regular file with this name exists right now.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|path| path.is_file()).unwrap_or(false)
    }

    /// File size in whole kilobytes, `0` when absent.
    #[must_use]
    pub fn size_in_kb(&self, name: &str) -> u64 {
        self.path_for(name)
            .ok()
            .and_then(|path| fs::metadata(path).ok())
            .filter(fs::Metadata::is_file)
            .map_or(0, |meta| meta.len() / 1024)
    }

    /// Content hash of the named file, `""` when it cannot be read.
    #[must_use]
    pub fn hash(&self, name: &str) -> String {
        match self.path_for(name) {
            Ok(path) => hash_file(&path),
            Err(_) => String::new(),
        }
    }

    /// Open a file read-only. `Ok(None)` when it does not exist.
    ///
    /// # Errors
    /// Returns `Security` for invalid names; no filesystem access happens then.
    pub fn open(&self, name: &str) -> Result<Option<File>> {
        let path = self.path_for(name)?;
        match File::open(&path) {
            Ok(file) if file.metadata().map(|meta| meta.is_file()).unwrap_or(false) => {
                Ok(Some(file))
            }
            Ok(_) => Ok(None),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Write `reader` under `name` via a temporary sibling and a rename, so a
    /// concurrent reader never sees a partially written file under its final name.
    ///
    /// # Errors
    /// Returns `Security` for invalid names and `Io` when writing or renaming fails.
    pub fn write_atomic(&self, name: &str, reader: &mut impl Read) -> Result<u64> {
        let final_path = self.path_for(name)?;
        fs::create_dir_all(&self.root)?;
        let partial_path = self.root.join(format!(".{name}{PARTIAL_SUFFIX}"));

        let written = {
            let mut file = File::create(&partial_path)?;
            let written = io::copy(reader, &mut file)?;
            file.flush()?;
            file.sync_all()?;
            written
        };

        if let Err(err) = fs::rename(&partial_path, &final_path) {
            let _ = fs::remove_file(&partial_path);
            return Err(err.into());
        }
        Ok(written)
    }

    /// Names of all regular files, sorted. In-flight partial writes are excluded.
    ///
    /// # Errors
    /// Returns `Io` when the directory cannot be listed.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(names),
            Err(err) => return Err(err.into()),
        };

        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') && name.ends_with(PARTIAL_SUFFIX) {
                continue;
            }
            names.push(name);
        }

        names.sort();
        Ok(names)
    }

    /// Delete one file. Returns whether something was removed.
    ///
    /// # Errors
    /// Returns `Security` for invalid names and `Io` for failures other than absence.
    pub fn remove(&self, name: &str) -> Result<bool> {
        let path = self.path_for(name)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}
