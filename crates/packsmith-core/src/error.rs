use thiserror::Error;

pub type Result<T> = std::result::Result<T, PacksmithError>;

#[derive(Debug, Error)]
pub enum PacksmithError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("security error: {0}")]
    Security(String),
    #[error("malformed archive: {0}")]
    MalformedArchive(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl PacksmithError {
    /// Stable category string used in CLI and service envelopes.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::ConstraintViolation(_) => "constraint_violation",
            Self::Security(_) => "security",
            Self::MalformedArchive(_) => "malformed_archive",
            Self::Io(_) => "io",
            Self::Storage(_) => "storage",
            Self::Internal(_) => "internal",
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
