use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;

use super::error::StorageError;
use super::hash::ContentHash;
use super::path::BlobPath;
use super::traits::{BlobEntry, BlobStore, BoxReader, StoredBlob};

/// Bytes store held in memory, with hooks to simulate damage.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<BlobPath, (Vec<u8>, DateTime<Utc>)>>,
    failing_puts: AtomicU32,
    corrupt_puts: AtomicU32,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` writes with an I/O error.
    pub fn fail_next_puts(&self, n: u32) {
        self.failing_puts.store(n, Ordering::SeqCst);
    }

    /// Flip a bit in what the next `n` writes actually persist.
    pub fn corrupt_next_puts(&self, n: u32) {
        self.corrupt_puts.store(n, Ordering::SeqCst);
    }

    /// Replace stored bytes without touching metadata.
    pub async fn overwrite(&self, path: &BlobPath, data: Vec<u8>) {
        let mut objects = self.objects.lock().await;
        let modified = objects.get(path).map(|(_, m)| *m).unwrap_or_else(Utc::now);
        objects.insert(path.clone(), (data, modified));
    }

    /// Insert bytes at a chosen path with a chosen modification time.
    pub async fn insert_at(&self, path: BlobPath, data: Vec<u8>, modified: DateTime<Utc>) {
        self.objects.lock().await.insert(path, (data, modified));
    }

    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_stream(&self, mut reader: BoxReader) -> Result<StoredBlob, StorageError> {
        if Self::take(&self.failing_puts) {
            return Err(StorageError::Io(std::io::Error::other("injected write failure")));
        }

        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        let stored = StoredBlob {
            path: BlobPath::allocate(),
            size: data.len() as u64,
            checksum: ContentHash::compute(&data),
        };

        if Self::take(&self.corrupt_puts) {
            match data.first_mut() {
                Some(byte) => *byte ^= 0x01,
                None => data.push(0),
            }
        }

        self.objects
            .lock()
            .await
            .insert(stored.path.clone(), (data, Utc::now()));
        Ok(stored)
    }

    async fn get_stream(&self, path: &BlobPath) -> Result<BoxReader, StorageError> {
        match self.objects.lock().await.get(path) {
            Some((data, _)) => Ok(Box::new(Cursor::new(data.clone()))),
            None => Err(StorageError::NotFound(path.to_string())),
        }
    }

    async fn exists(&self, path: &BlobPath) -> Result<bool, StorageError> {
        Ok(self.objects.lock().await.contains_key(path))
    }

    async fn delete(&self, path: &BlobPath) -> Result<bool, StorageError> {
        Ok(self.objects.lock().await.remove(path).is_some())
    }

    async fn list(&self) -> Result<Vec<BlobEntry>, StorageError> {
        Ok(self
            .objects
            .lock()
            .await
            .iter()
            .map(|(path, (_, modified))| BlobEntry {
                path: path.clone(),
                modified: *modified,
            })
            .collect())
    }
}
