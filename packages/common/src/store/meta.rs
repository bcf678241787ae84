use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ContentError;
use crate::storage::{BlobPath, ContentHash};

/// Metadata row for one stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRecord {
    /// Stable for the lifetime of the filename; survives re-uploads.
    pub id: Uuid,
    pub filename: String,
    pub file_type: String,
    pub file_size: i64,
    pub file_path: BlobPath,
    pub checksum: ContentHash,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_id: Option<Uuid>,
    pub revision: Uuid,
}

/// Fields the writer supplies; ids and timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBlobRecord {
    pub filename: String,
    pub file_type: String,
    pub file_size: i64,
    pub file_path: BlobPath,
    pub checksum: ContentHash,
    pub user_id: Option<Uuid>,
    pub revision: Uuid,
}

impl NewBlobRecord {
    pub(crate) fn into_record(self, id: Uuid, created_at: DateTime<Utc>) -> BlobRecord {
        BlobRecord {
            id,
            filename: self.filename,
            file_type: self.file_type,
            file_size: self.file_size,
            file_path: self.file_path,
            checksum: self.checksum,
            created_at,
            updated_at: Utc::now(),
            user_id: self.user_id,
            revision: self.revision,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(BlobRecord),
    /// `replaced_path` is the previous bytes location when it changed.
    Updated {
        record: BlobRecord,
        replaced_path: Option<BlobPath>,
    },
    /// The stored record is newer than the write; nothing changed.
    Stale(BlobRecord),
}

impl UpsertOutcome {
    pub fn record(&self) -> &BlobRecord {
        match self {
            Self::Inserted(record) | Self::Stale(record) => record,
            Self::Updated { record, .. } => record,
        }
    }
}

/// Relational metadata for blob content, keyed by filename.
#[async_trait]
pub trait BlobMetaStore: Send + Sync {
    async fn find_by_filename(&self, filename: &str) -> Result<Option<BlobRecord>, ContentError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<BlobRecord>, ContentError>;

    /// Insert or update the record for `new.filename` atomically.
    ///
    /// On update the id, `created_at` and owner are kept. A write whose
    /// revision is older than the stored one returns [`UpsertOutcome::Stale`].
    async fn upsert(&self, new: NewBlobRecord) -> Result<UpsertOutcome, ContentError>;

    /// Move the record to a new revision that reuses its current bytes.
    ///
    /// Applies only while the stored record still points at `new.file_path`.
    /// Returns `None` when the record is gone or has moved to other bytes,
    /// in which case nothing changed and the caller must write its own copy.
    async fn restamp(&self, new: NewBlobRecord) -> Result<Option<UpsertOutcome>, ContentError>;

    /// Remove the record, returning it so the caller can release its bytes.
    async fn delete_by_filename(&self, filename: &str)
    -> Result<Option<BlobRecord>, ContentError>;

    /// Every `file_path` currently referenced.
    async fn referenced_paths(&self) -> Result<HashSet<BlobPath>, ContentError>;
}
