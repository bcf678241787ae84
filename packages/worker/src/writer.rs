use std::sync::Arc;
use std::time::Duration;

use common::filename::validate_flat_filename;
use common::storage::{BlobPath, BlobStore, ContentHash};
use common::store::{BlobMetaStore, NewBlobRecord, TextStore, TextUpsert, UpsertOutcome};
use common::timeout::bounded;
use common::{ContentError, IngestionMessage, StorageClass, classify, content_type_for};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What a successful [`DurableWriter::persist`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Committed {
    TextStored,
    BlobStored {
        id: Uuid,
        /// Bytes location that was superseded, if any.
        replaced: Option<BlobPath>,
    },
    /// The message had already been applied.
    Unchanged,
    /// A newer message for the same filename has already been applied.
    Stale,
}

/// Sole writer of both backends on the ingest path.
#[derive(Clone)]
pub struct DurableWriter {
    text: Arc<dyn TextStore>,
    meta: Arc<dyn BlobMetaStore>,
    blobs: Arc<dyn BlobStore>,
    call_timeout: Duration,
}

impl DurableWriter {
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

    /// Persist one message to the backend its filename classifies to.
    ///
    /// Safe to call again with the same message after any failure.
    pub async fn persist(&self, msg: &IngestionMessage) -> Result<Committed, ContentError> {
        let filename = validate_flat_filename(&msg.filename)
            .map_err(|e| ContentError::Validation(e.to_string()))?;

        match classify(filename) {
            StorageClass::Text => self.persist_text(filename, msg).await,
            StorageClass::Blob => self.persist_blob(filename, msg).await,
        }
    }

    async fn persist_text(
        &self,
        filename: &str,
        msg: &IngestionMessage,
    ) -> Result<Committed, ContentError> {
        let text = std::str::from_utf8(&msg.payload)
            .map_err(|e| ContentError::Validation(format!("text is not valid UTF-8: {e}")))?;

        match bounded(self.call_timeout, self.text.upsert(filename, text, msg.id)).await? {
            TextUpsert::Written(_) => {
                info!(filename, message_id = %msg.id, bytes = msg.payload.len(), "Stored text");
                Ok(Committed::TextStored)
            }
            TextUpsert::Stale(current) => {
                info!(filename, message_id = %msg.id, current = %current.revision, "Skipping stale text write");
                Ok(Committed::Stale)
            }
        }
    }

    async fn persist_blob(
        &self,
        filename: &str,
        msg: &IngestionMessage,
    ) -> Result<Committed, ContentError> {
        let existing = bounded(self.call_timeout, self.meta.find_by_filename(filename)).await?;
        let checksum = ContentHash::compute(&msg.payload);

        if let Some(current) = &existing {
            if current.revision > msg.id {
                info!(filename, message_id = %msg.id, current = %current.revision, "Skipping stale blob write");
                return Ok(Committed::Stale);
            }
            if current.revision == msg.id {
                debug!(filename, message_id = %msg.id, "Blob already committed");
                return Ok(Committed::Unchanged);
            }
        }

        // Identical bytes already on disk are reused, but only while the
        // record still points at them; otherwise a concurrent delete or
        // re-upload may already have released that path.
        if let Some(current) = existing.filter(|c| c.checksum == checksum) {
            if bounded(self.call_timeout, self.blobs.exists(&current.file_path)).await? {
                let new = Self::new_record(filename, msg, current.file_path, checksum);
                match bounded(self.call_timeout, self.meta.restamp(new)).await? {
                    Some(outcome) => return Ok(self.settle(filename, msg, outcome, None).await),
                    None => {
                        debug!(filename, message_id = %msg.id, "Record moved off reusable bytes, writing a fresh copy");
                    }
                }
            }
        }

        // Bytes go down before metadata so a crash in between leaves only
        // an unreferenced file.
        let file_path = self.write_verified(filename, &msg.payload, checksum).await?;
        let new = Self::new_record(filename, msg, file_path.clone(), checksum);

        // On failure the fresh bytes are left for the sweeper: a timed-out
        // upsert may still have committed and be pointing at them.
        let outcome = bounded(self.call_timeout, self.meta.upsert(new)).await?;
        Ok(self.settle(filename, msg, outcome, Some(&file_path)).await)
    }

    fn new_record(
        filename: &str,
        msg: &IngestionMessage,
        file_path: BlobPath,
        checksum: ContentHash,
    ) -> NewBlobRecord {
        NewBlobRecord {
            filename: filename.to_string(),
            file_type: content_type_for(filename),
            file_size: msg.payload.len() as i64,
            file_path,
            checksum,
            user_id: msg.owner,
            revision: msg.id,
        }
    }

    /// `fresh` is the path written for this message, if any; it is released
    /// when the write lost to a newer revision.
    ///
    /// Superseded bytes are never deleted here. A reader that resolved the
    /// previous record may still be streaming them, so they stay on disk
    /// until the orphan sweeper's grace period has passed.
    async fn settle(
        &self,
        filename: &str,
        msg: &IngestionMessage,
        outcome: UpsertOutcome,
        fresh: Option<&BlobPath>,
    ) -> Committed {
        match outcome {
            UpsertOutcome::Inserted(record) => {
                info!(filename, message_id = %msg.id, id = %record.id, size = record.file_size, "Stored blob");
                Committed::BlobStored {
                    id: record.id,
                    replaced: None,
                }
            }
            UpsertOutcome::Updated {
                record,
                replaced_path,
            } => {
                info!(
                    filename,
                    message_id = %msg.id,
                    id = %record.id,
                    size = record.file_size,
                    superseded = ?replaced_path.as_ref().map(BlobPath::as_str),
                    "Replaced blob"
                );
                Committed::BlobStored {
                    id: record.id,
                    replaced: replaced_path,
                }
            }
            UpsertOutcome::Stale(current) => {
                if let Some(path) = fresh {
                    self.release(filename, path).await;
                }
                info!(filename, message_id = %msg.id, current = %current.revision, "Lost race to newer blob write");
                Committed::Stale
            }
        }
    }

    /// Write bytes to a new path and confirm what landed matches `expected`.
    async fn write_verified(
        &self,
        filename: &str,
        payload: &[u8],
        expected: ContentHash,
    ) -> Result<BlobPath, ContentError> {
        let stored = bounded(self.call_timeout, self.blobs.put(payload)).await?;
        let readback = bounded(self.call_timeout, self.blobs.get(&stored.path)).await;

        let actual = match readback {
            Ok(bytes) => ContentHash::compute(&bytes),
            Err(e) => {
                self.release(filename, &stored.path).await;
                return Err(e);
            }
        };

        if stored.checksum != expected || actual != expected {
            warn!(
                filename,
                path = %stored.path,
                expected = %expected,
                actual = %actual,
                "Checksum mismatch after write"
            );
            self.release(filename, &stored.path).await;
            return Err(ContentError::Unavailable(format!(
                "checksum mismatch after writing '{filename}'"
            )));
        }

        Ok(stored.path)
    }

    /// Best-effort delete; anything left behind is an orphan for the sweeper.
    async fn release(&self, filename: &str, path: &BlobPath) {
        if let Err(e) = bounded(self.call_timeout, self.blobs.delete(path)).await {
            warn!(filename, path = %path, error = %e, "Failed to delete blob bytes, leaving orphan");
        }
    }
}
