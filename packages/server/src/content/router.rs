use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::filename::validate_flat_filename;
use common::storage::{BlobStore, ContentHash, StorageError};
use common::store::{BlobMetaStore, BlobRecord, TextStore};
use common::timeout::bounded;
use common::{ContentError, StorageClass, classify, content_type_for};
use tracing::{debug, info, warn};

/// Content as served, whichever backend it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub class: StorageClass,
    pub checksum: ContentHash,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deleted {
    pub filename: String,
    pub class: StorageClass,
}

/// Read and delete path over both backends.
#[derive(Clone)]
pub struct ContentRouter {
    text: Arc<dyn TextStore>,
    meta: Arc<dyn BlobMetaStore>,
    blobs: Arc<dyn BlobStore>,
    call_timeout: Duration,
}

impl ContentRouter {
    pub fn new(
        text: Arc<dyn TextStore>,
        meta: Arc<dyn BlobMetaStore>,
        blobs: Arc<dyn BlobStore>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            text,
            meta,
            blobs,
            call_timeout,
        }
    }

    /// Look up `filename` in the backend it classifies to.
    ///
    /// A blob whose record exists but whose bytes are missing or fail
    /// verification is [`ContentError::Corrupted`], never `NotFound`.
    pub async fn fetch_content(&self, filename: &str) -> Result<Content, ContentError> {
        let filename = validate_flat_filename(filename)
            .map_err(|e| ContentError::Validation(e.to_string()))?;

        match classify(filename) {
            StorageClass::Text => self.fetch_text(filename).await,
            StorageClass::Blob => self.fetch_blob(filename).await,
        }
    }

    async fn fetch_text(&self, filename: &str) -> Result<Content, ContentError> {
        let doc = bounded(self.call_timeout, self.text.get(filename))
            .await?
            .ok_or_else(|| ContentError::NotFound(filename.to_string()))?;

        let bytes = doc.text.into_bytes();
        Ok(Content {
            filename: doc.filename,
            checksum: ContentHash::compute(&bytes),
            bytes,
            content_type: content_type_for(filename),
            class: StorageClass::Text,
            updated_at: doc.created_at,
        })
    }

    async fn fetch_blob(&self, filename: &str) -> Result<Content, ContentError> {
        let mut record = self.find_record(filename).await?;

        let bytes = match self.read_bytes(&record).await? {
            Some(bytes) => bytes,
            None => {
                // A re-upload or delete may have released these bytes after
                // the record was read. Only the current record's bytes count.
                let current = self.find_record(filename).await?;
                if current.file_path == record.file_path {
                    return Err(corrupted(&record, format!("bytes missing at {}", record.file_path)));
                }
                debug!(filename, from = %record.file_path, to = %current.file_path, "Record moved while reading, retrying");
                record = current;
                self.read_bytes(&record).await?.ok_or_else(|| {
                    corrupted(&record, format!("bytes missing at {}", record.file_path))
                })?
            }
        };

        let actual = ContentHash::compute(&bytes);
        if actual != record.checksum {
            return Err(corrupted(
                &record,
                format!("checksum mismatch: stored {}, read {actual}", record.checksum),
            ));
        }

        debug!(filename, size = bytes.len(), "Served blob");
        Ok(Content {
            filename: record.filename,
            bytes,
            content_type: record.file_type,
            class: StorageClass::Blob,
            checksum: actual,
            updated_at: record.updated_at,
        })
    }

    async fn find_record(&self, filename: &str) -> Result<BlobRecord, ContentError> {
        bounded(self.call_timeout, self.meta.find_by_filename(filename))
            .await?
            .ok_or_else(|| ContentError::NotFound(filename.to_string()))
    }

    /// `None` when nothing is stored at the record's path.
    async fn read_bytes(&self, record: &BlobRecord) -> Result<Option<Vec<u8>>, ContentError> {
        bounded(self.call_timeout, async {
            match self.blobs.get(&record.file_path).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(StorageError::NotFound(_)) => Ok(None),
                Err(e) => Err(corrupted(record, format!("bytes unreadable: {e}"))),
            }
        })
        .await
    }

    /// Remove `filename` from its backend.
    ///
    /// Blob metadata goes first; if the bytes then fail to delete they are
    /// left as an orphan for the sweeper.
    pub async fn delete_content(&self, filename: &str) -> Result<Deleted, ContentError> {
        let filename = validate_flat_filename(filename)
            .map_err(|e| ContentError::Validation(e.to_string()))?;
        let class = classify(filename);

        match class {
            StorageClass::Text => {
                if !bounded(self.call_timeout, self.text.delete(filename)).await? {
                    return Err(ContentError::NotFound(filename.to_string()));
                }
            }
            StorageClass::Blob => {
                let record = bounded(self.call_timeout, self.meta.delete_by_filename(filename))
                    .await?
                    .ok_or_else(|| ContentError::NotFound(filename.to_string()))?;

                match bounded(self.call_timeout, self.blobs.delete(&record.file_path)).await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(filename, path = %record.file_path, "Blob bytes were already gone");
                    }
                    Err(e) => {
                        warn!(filename, path = %record.file_path, error = %e, "Failed to delete blob bytes, leaving orphan");
                    }
                }
            }
        }

        info!(filename, class = %class, "Content deleted");
        Ok(Deleted {
            filename: filename.to_string(),
            class,
        })
    }

    /// Check that the text store answers. The metadata store is checked through its
    /// database connection by the caller.
    pub async fn ping_text_store(&self) -> Result<(), ContentError> {
        bounded(self.call_timeout, self.text.ping()).await
    }
}

fn corrupted(record: &BlobRecord, detail: String) -> ContentError {
    ContentError::Corrupted {
        filename: record.filename.clone(),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::BlobPath;
    use common::storage::memory::MemoryBlobStore;
    use common::store::NewBlobRecord;
    use common::store::memory::{MemoryBlobMetaStore, MemoryTextStore};
    use uuid::Uuid;

    struct Fixture {
        text: Arc<MemoryTextStore>,
        meta: Arc<MemoryBlobMetaStore>,
        blobs: Arc<MemoryBlobStore>,
        router: ContentRouter,
    }

    fn fixture() -> Fixture {
        let text = Arc::new(MemoryTextStore::new());
        let meta = Arc::new(MemoryBlobMetaStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let router = ContentRouter::new(
            text.clone(),
            meta.clone(),
            blobs.clone(),
            Duration::from_secs(1),
        );
        Fixture {
            text,
            meta,
            blobs,
            router,
        }
    }

    async fn store_blob(f: &Fixture, filename: &str, data: &[u8]) -> BlobPath {
        let stored = f.blobs.put(data).await.unwrap();
        f.meta
            .upsert(NewBlobRecord {
                filename: filename.into(),
                file_type: content_type_for(filename),
                file_size: data.len() as i64,
                file_path: stored.path.clone(),
                checksum: stored.checksum,
                user_id: None,
                revision: Uuid::now_v7(),
            })
            .await
            .unwrap();
        stored.path
    }

    #[tokio::test]
    async fn fetches_text() {
        let f = fixture();
        f.text
            .upsert("report.txt", "hello", Uuid::now_v7())
            .await
            .unwrap();

        let content = f.router.fetch_content("report.txt").await.unwrap();
        assert_eq!(content.bytes, b"hello");
        assert_eq!(content.content_type, "text/plain");
        assert_eq!(content.class, StorageClass::Text);
        assert_eq!(content.checksum, ContentHash::compute(b"hello"));
    }

    #[tokio::test]
    async fn fetches_blob() {
        let f = fixture();
        let data: Vec<u8> = (0..1024u32).map(|i| (i * 7 % 251) as u8).collect();
        store_blob(&f, "photo.png", &data).await;

        let content = f.router.fetch_content("photo.png").await.unwrap();
        assert_eq!(content.bytes, data);
        assert_eq!(content.content_type, "image/png");
        assert_eq!(content.checksum, ContentHash::compute(&data));
    }

    #[tokio::test]
    async fn missing_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.router.fetch_content("nothing.txt").await,
            Err(ContentError::NotFound(_))
        ));
        assert!(matches!(
            f.router.fetch_content("nothing.bin").await,
            Err(ContentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn text_never_falls_back_to_blob() {
        let f = fixture();
        store_blob(&f, "weird.txt", b"as blob").await;
        assert!(matches!(
            f.router.fetch_content("weird.txt").await,
            Err(ContentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn missing_bytes_is_corrupted() {
        let f = fixture();
        let path = store_blob(&f, "photo.png", b"abcd").await;
        f.blobs.delete(&path).await.unwrap();

        assert!(matches!(
            f.router.fetch_content("photo.png").await,
            Err(ContentError::Corrupted { .. })
        ));
    }

    fn interleaved(f: &Fixture, mid_read: MidRead) -> ContentRouter {
        ContentRouter::new(
            f.text.clone(),
            f.meta.clone(),
            Arc::new(InterleavedBlobs {
                inner: f.blobs.clone(),
                meta: f.meta.clone(),
                mid_read: std::sync::Mutex::new(Some(mid_read)),
            }),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn record_moving_mid_read_serves_current_bytes() {
        let f = fixture();
        store_blob(&f, "photo.png", b"one").await;
        let router = interleaved(&f, MidRead::Reupload(b"two".to_vec()));

        let content = router.fetch_content("photo.png").await.unwrap();
        assert_eq!(content.bytes, b"two");
        assert_eq!(content.checksum, ContentHash::compute(b"two"));
    }

    #[tokio::test]
    async fn record_deleted_mid_read_is_not_found() {
        let f = fixture();
        store_blob(&f, "photo.png", b"one").await;
        let router = interleaved(&f, MidRead::Delete);

        assert!(matches!(
            router.fetch_content("photo.png").await,
            Err(ContentError::NotFound(_))
        ));
    }

    enum MidRead {
        Reupload(Vec<u8>),
        Delete,
    }

    /// Runs a concurrent re-upload or delete of `photo.png`, including the
    /// release of the old bytes, right before the first read.
    struct InterleavedBlobs {
        inner: Arc<MemoryBlobStore>,
        meta: Arc<MemoryBlobMetaStore>,
        mid_read: std::sync::Mutex<Option<MidRead>>,
    }

    #[async_trait::async_trait]
    impl BlobStore for InterleavedBlobs {
        async fn put_stream(
            &self,
            reader: common::storage::BoxReader,
        ) -> Result<common::storage::StoredBlob, StorageError> {
            self.inner.put_stream(reader).await
        }

        async fn get_stream(
            &self,
            path: &BlobPath,
        ) -> Result<common::storage::BoxReader, StorageError> {
            let mid_read = self.mid_read.lock().unwrap().take();
            match mid_read {
                Some(MidRead::Reupload(data)) => {
                    let stored = self.inner.put(&data).await?;
                    self.meta
                        .upsert(NewBlobRecord {
                            filename: "photo.png".into(),
                            file_type: content_type_for("photo.png"),
                            file_size: data.len() as i64,
                            file_path: stored.path,
                            checksum: stored.checksum,
                            user_id: None,
                            revision: Uuid::now_v7(),
                        })
                        .await
                        .unwrap();
                    self.inner.delete(path).await?;
                }
                Some(MidRead::Delete) => {
                    self.meta.delete_by_filename("photo.png").await.unwrap();
                    self.inner.delete(path).await?;
                }
                None => {}
            }
            self.inner.get_stream(path).await
        }

        async fn exists(&self, path: &BlobPath) -> Result<bool, StorageError> {
            self.inner.exists(path).await
        }

        async fn delete(&self, path: &BlobPath) -> Result<bool, StorageError> {
            self.inner.delete(path).await
        }

        async fn list(&self) -> Result<Vec<common::storage::BlobEntry>, StorageError> {
            self.inner.list().await
        }
    }

    #[tokio::test]
    async fn tampered_bytes_are_corrupted() {
        let f = fixture();
        let path = store_blob(&f, "photo.png", b"abcd").await;
        f.blobs.overwrite(&path, b"abce".to_vec()).await;

        assert!(matches!(
            f.router.fetch_content("photo.png").await,
            Err(ContentError::Corrupted { .. })
        ));
    }

    #[tokio::test]
    async fn deletes_blob_metadata_and_bytes() {
        let f = fixture();
        let path = store_blob(&f, "photo.png", b"abcd").await;

        let deleted = f.router.delete_content("photo.png").await.unwrap();
        assert_eq!(deleted.class, StorageClass::Blob);
        assert_eq!(f.meta.len().await, 0);
        assert!(!f.blobs.exists(&path).await.unwrap());

        assert!(matches!(
            f.router.fetch_content("photo.png").await,
            Err(ContentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn deletes_text() {
        let f = fixture();
        f.text
            .upsert("report.txt", "hello", Uuid::now_v7())
            .await
            .unwrap();

        f.router.delete_content("report.txt").await.unwrap();
        assert_eq!(f.text.len().await, 0);
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.router.delete_content("missing.bin").await,
            Err(ContentError::NotFound(_))
        ));
        assert!(matches!(
            f.router.delete_content("missing.txt").await,
            Err(ContentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_survives_missing_bytes() {
        let f = fixture();
        let path = store_blob(&f, "photo.png", b"abcd").await;
        f.blobs.delete(&path).await.unwrap();

        assert!(f.router.delete_content("photo.png").await.is_ok());
        assert_eq!(f.meta.len().await, 0);
    }

    #[tokio::test]
    async fn backend_outage_is_unavailable() {
        let f = fixture();
        f.meta.fail_next(1);
        let err = f.router.fetch_content("photo.png").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn invalid_name_is_rejected() {
        let f = fixture();
        assert!(matches!(
            f.router.fetch_content("../secret").await,
            Err(ContentError::Validation(_))
        ));
    }
}
