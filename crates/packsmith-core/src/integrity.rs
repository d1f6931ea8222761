//! Content hashing for sticker images.
//!
//! Hashes feed duplicate detection only. A failure to hash never aborts the
//! caller: [`hash_file`] degrades to an empty string.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const HASH_CHUNK_BYTES: usize = 64 * 1024;

/// Calculate the hex SHA-256 digest of a file, streaming it in fixed-size chunks.
///
/// # Errors
/// Returns the underlying I/O error when the file cannot be opened or read.
pub fn try_hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; HASH_CHUNK_BYTES];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Fail-soft variant of [`try_hash_file`]: returns `""` on any I/O failure.
#[must_use]
pub fn hash_file(path: &Path) -> String {
    match try_hash_file(path) {
        Ok(digest) => digest,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to hash file");
            String::new()
        }
    }
}

#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
