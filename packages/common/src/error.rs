use std::time::Duration;

use thiserror::Error;

use crate::storage::StorageError;

/// Error taxonomy shared by the gateway, the router and the writer.
///
/// The kind survives every layer: adapters convert their driver errors into
/// one of these variants and callers match on it.
#[derive(Debug, Error)]
pub enum ContentError {
    /// Bad input; rejected synchronously and never enqueued.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("payload exceeds size limit ({actual} > {limit} bytes)")]
    PayloadTooLarge { actual: u64, limit: u64 },

    /// No live record for the filename in its backend.
    #[error("content not found: {0}")]
    NotFound(String),

    /// Metadata exists but the bytes are missing or do not match it.
    #[error("content for '{filename}' is corrupted: {detail}")]
    Corrupted { filename: String, detail: String },

    /// Backend or queue is down.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),
}

impl ContentError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Corrupted { .. } => "CORRUPTED",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Timeout(_) => "TIMEOUT",
        }
    }
}

impl From<StorageError> for ContentError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(path) => Self::NotFound(path),
            StorageError::SizeLimitExceeded { actual, limit } => {
                Self::PayloadTooLarge { actual, limit }
            }
            StorageError::InvalidPath(msg) => Self::Validation(msg),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

#[cfg(feature = "sea-orm")]
impl From<sea_orm::DbErr> for ContentError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Unavailable(format!("metadata store: {err}"))
    }
}

#[cfg(feature = "mongodb")]
impl From<mongodb::error::Error> for ContentError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Unavailable(format!("text store: {err}"))
    }
}
