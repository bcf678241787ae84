//! In-process store backends for tests and single-node demos.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::meta::{BlobMetaStore, BlobRecord, NewBlobRecord, UpsertOutcome};
use super::text::{TextDocument, TextStore, TextUpsert};
use crate::error::ContentError;
use crate::storage::BlobPath;

/// Counts down injected failures.
#[derive(Debug, Default)]
struct Faults(AtomicU32);

impl Faults {
    fn arm(&self, n: u32) {
        self.0.store(n, Ordering::SeqCst);
    }

    fn check(&self, what: &str) -> Result<(), ContentError> {
        let tripped = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            Err(ContentError::Unavailable(format!("{what}: injected failure")))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryTextStore {
    docs: Mutex<HashMap<String, TextDocument>>,
    faults: Faults,
}

impl MemoryTextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls fail with [`ContentError::Unavailable`].
    pub fn fail_next(&self, n: u32) {
        self.faults.arm(n);
    }

    pub async fn len(&self) -> usize {
        self.docs.lock().await.len()
    }
}

#[async_trait]
impl TextStore for MemoryTextStore {
    async fn get(&self, filename: &str) -> Result<Option<TextDocument>, ContentError> {
        self.faults.check("text store")?;
        Ok(self.docs.lock().await.get(filename).cloned())
    }

    async fn upsert(
        &self,
        filename: &str,
        text: &str,
        revision: Uuid,
    ) -> Result<TextUpsert, ContentError> {
        self.faults.check("text store")?;
        let mut docs = self.docs.lock().await;

        if let Some(current) = docs.get(filename).filter(|doc| doc.revision > revision) {
            return Ok(TextUpsert::Stale(current.clone()));
        }

        let created_at = docs
            .get(filename)
            .map(|doc| doc.created_at)
            .unwrap_or_else(Utc::now);
        let doc = TextDocument {
            filename: filename.to_string(),
            text: text.to_string(),
            created_at,
            revision,
        };
        docs.insert(filename.to_string(), doc.clone());
        Ok(TextUpsert::Written(doc))
    }

    async fn delete(&self, filename: &str) -> Result<bool, ContentError> {
        self.faults.check("text store")?;
        Ok(self.docs.lock().await.remove(filename).is_some())
    }
}

#[derive(Debug, Default)]
pub struct MemoryBlobMetaStore {
    records: Mutex<HashMap<String, BlobRecord>>,
    faults: Faults,
}

impl MemoryBlobMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls fail with [`ContentError::Unavailable`].
    pub fn fail_next(&self, n: u32) {
        self.faults.arm(n);
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Overwrite a record directly, bypassing revision checks.
    pub async fn put_raw(&self, record: BlobRecord) {
        self.records
            .lock()
            .await
            .insert(record.filename.clone(), record);
    }
}

fn apply_update(
    records: &mut HashMap<String, BlobRecord>,
    existing: BlobRecord,
    new: NewBlobRecord,
) -> UpsertOutcome {
    if existing.revision > new.revision {
        return UpsertOutcome::Stale(existing);
    }

    let mut record = new.into_record(existing.id, existing.created_at);
    record.user_id = existing.user_id.or(record.user_id);
    records.insert(record.filename.clone(), record.clone());

    let replaced_path = (existing.file_path != record.file_path).then_some(existing.file_path);
    UpsertOutcome::Updated {
        record,
        replaced_path,
    }
}

#[async_trait]
impl BlobMetaStore for MemoryBlobMetaStore {
    async fn find_by_filename(&self, filename: &str) -> Result<Option<BlobRecord>, ContentError> {
        self.faults.check("metadata store")?;
        Ok(self.records.lock().await.get(filename).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<BlobRecord>, ContentError> {
        self.faults.check("metadata store")?;
        Ok(self
            .records
            .lock()
            .await
            .values()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn upsert(&self, new: NewBlobRecord) -> Result<UpsertOutcome, ContentError> {
        self.faults.check("metadata store")?;
        let mut records = self.records.lock().await;

        let Some(existing) = records.get(&new.filename).cloned() else {
            let record = new.into_record(Uuid::now_v7(), Utc::now());
            records.insert(record.filename.clone(), record.clone());
            return Ok(UpsertOutcome::Inserted(record));
        };

        Ok(apply_update(&mut records, existing, new))
    }

    async fn restamp(&self, new: NewBlobRecord) -> Result<Option<UpsertOutcome>, ContentError> {
        self.faults.check("metadata store")?;
        let mut records = self.records.lock().await;

        match records.get(&new.filename).cloned() {
            Some(existing) if existing.file_path == new.file_path => {
                Ok(Some(apply_update(&mut records, existing, new)))
            }
            _ => Ok(None),
        }
    }

    async fn delete_by_filename(
        &self,
        filename: &str,
    ) -> Result<Option<BlobRecord>, ContentError> {
        self.faults.check("metadata store")?;
        Ok(self.records.lock().await.remove(filename))
    }

    async fn referenced_paths(&self) -> Result<HashSet<BlobPath>, ContentError> {
        self.faults.check("metadata store")?;
        Ok(self
            .records
            .lock()
            .await
            .values()
            .map(|r| r.file_path.clone())
            .collect())
    }
}
