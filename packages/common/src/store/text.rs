use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ContentError;

/// A `.txt` upload, stored inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDocument {
    pub filename: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Id of the message that last wrote this document.
    pub revision: Uuid,
}

/// Outcome of a revision-guarded write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextUpsert {
    Written(TextDocument),
    /// The stored document is newer than the write; nothing changed.
    Stale(TextDocument),
}

/// Document store for text content, keyed by filename.
#[async_trait]
pub trait TextStore: Send + Sync {
    async fn get(&self, filename: &str) -> Result<Option<TextDocument>, ContentError>;

    /// Insert or overwrite the document for `filename`.
    ///
    /// An existing document keeps its `created_at`. A write whose revision is
    /// older than the stored one is rejected as [`TextUpsert::Stale`].
    async fn upsert(
        &self,
        filename: &str,
        text: &str,
        revision: Uuid,
    ) -> Result<TextUpsert, ContentError>;

    /// Returns `false` when there was nothing to delete.
    async fn delete(&self, filename: &str) -> Result<bool, ContentError>;

    async fn ping(&self) -> Result<(), ContentError> {
        Ok(())
    }
}
