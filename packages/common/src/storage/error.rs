use std::fmt;

/// Errors that can occur during blob bytes operations.
#[derive(Debug)]
pub enum StorageError {
    /// No bytes are stored at the given path.
    NotFound(String),
    /// An I/O error occurred.
    Io(std::io::Error),
    /// The provided checksum string is invalid.
    InvalidHash(String),
    /// The provided blob path is not one this store could have allocated.
    InvalidPath(String),
    /// The blob exceeds the configured size limit.
    SizeLimitExceeded { actual: u64, limit: u64 },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "blob not found: {path}"),
            Self::Io(err) => write!(f, "storage IO error: {err}"),
            Self::InvalidHash(msg) => write!(f, "invalid checksum: {msg}"),
            Self::InvalidPath(msg) => write!(f, "invalid blob path: {msg}"),
            Self::SizeLimitExceeded { actual, limit } => {
                write!(f, "blob exceeds size limit ({actual} > {limit} bytes)")
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
