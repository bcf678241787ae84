use serde::{Deserialize, Serialize};

/// Extension (including the dot) that routes an upload to the text store.
pub const TEXT_EXTENSION: &str = ".txt";

pub const TEXT_CONTENT_TYPE: &str = "text/plain";
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Backend class a filename is persisted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageClass {
    /// Inline text document in the text store.
    Text,
    /// Metadata row plus bytes on the file area.
    Blob,
}

impl StorageClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Blob => "blob",
        }
    }
}

impl std::fmt::Display for StorageClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a filename to its storage class.
///
/// Both the ingestion writer and the read/delete router call this; a filename
/// therefore never has live content in both backends.
pub fn classify(filename: &str) -> StorageClass {
    if filename.ends_with(TEXT_EXTENSION) {
        StorageClass::Text
    } else {
        StorageClass::Blob
    }
}

/// MIME type served for a filename.
pub fn content_type_for(filename: &str) -> String {
    match classify(filename) {
        StorageClass::Text => TEXT_CONTENT_TYPE.to_string(),
        StorageClass::Blob => mime_guess::from_path(filename)
            .first()
            .map(|m| m.to_string())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
    }
}
