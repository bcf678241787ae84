use std::io::Cursor;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::StorageError;
use super::hash::ContentHash;
use super::path::BlobPath;

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// What a successful write produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub path: BlobPath,
    pub size: u64,
    pub checksum: ContentHash,
}

/// One stored object, as seen by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    pub path: BlobPath,
    pub modified: DateTime<Utc>,
}

/// Path-addressed bytes storage.
///
/// Every write lands at a freshly allocated path; nothing is ever overwritten
/// in place. Which path is live for a filename is decided by metadata.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes at a new path.
    async fn put(&self, data: &[u8]) -> Result<StoredBlob, StorageError> {
        let reader: BoxReader = Box::new(Cursor::new(data.to_vec()));
        self.put_stream(reader).await
    }

    /// Store data from an async reader at a new path.
    async fn put_stream(&self, reader: BoxReader) -> Result<StoredBlob, StorageError>;

    /// Retrieve all bytes stored at `path`.
    async fn get(&self, path: &BlobPath) -> Result<Vec<u8>, StorageError> {
        let mut reader = self.get_stream(path).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Retrieve a blob as a streaming async reader.
    async fn get_stream(&self, path: &BlobPath) -> Result<BoxReader, StorageError>;

    async fn exists(&self, path: &BlobPath) -> Result<bool, StorageError>;

    /// Delete the bytes at `path`.
    ///
    /// Returns `true` if the blob was deleted, `false` if it did not exist.
    async fn delete(&self, path: &BlobPath) -> Result<bool, StorageError>;

    /// Enumerate every stored object. Used by the orphan sweep.
    async fn list(&self) -> Result<Vec<BlobEntry>, StorageError>;

    /// Remove leftovers of interrupted writes last touched before `cutoff`,
    /// returning how many went. Stores that never stage writes have none.
    async fn reap_staging(&self, _cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        Ok(0)
    }
}
