use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

use super::error::StorageError;
use super::hash::ContentHash;
use super::path::BlobPath;
use super::traits::{BlobEntry, BlobStore, BoxReader, StoredBlob};

/// Filesystem-backed bytes store.
///
/// Layout: `{base_path}/{shard}/{id}`, with in-progress writes staged under
/// `{base_path}/.tmp` and renamed into place once fully flushed.
pub struct FilesystemBlobStore {
    base_path: PathBuf,
    max_size: u64,
}

impl FilesystemBlobStore {
    pub async fn new(base_path: PathBuf, max_size: u64) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path).await?;
        fs::create_dir_all(base_path.join(".tmp")).await?;
        Ok(Self {
            base_path,
            max_size,
        })
    }

    fn file_path(&self, path: &BlobPath) -> PathBuf {
        self.base_path.join(path.shard()).join(path.name())
    }

    fn staging_dir(&self) -> PathBuf {
        self.base_path.join(".tmp")
    }

    fn temp_path(&self) -> PathBuf {
        self.staging_dir().join(uuid::Uuid::new_v4().to_string())
    }

    /// Stream into `temp_path`, then move it to a fresh blob path.
    ///
    /// Leaves `temp_path` behind on error; the caller removes it.
    async fn write_staged(
        &self,
        temp_path: &Path,
        mut reader: BoxReader,
    ) -> Result<StoredBlob, StorageError> {
        let mut hasher = Sha256::new();
        let mut total_bytes: u64 = 0;
        let mut buf = vec![0u8; 64 * 1024];
        let mut temp_file = fs::File::create(temp_path).await?;

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }

            total_bytes += n as u64;
            if total_bytes > self.max_size {
                return Err(StorageError::SizeLimitExceeded {
                    actual: total_bytes,
                    limit: self.max_size,
                });
            }

            hasher.update(&buf[..n]);
            temp_file.write_all(&buf[..n]).await?;
        }

        temp_file.flush().await?;
        temp_file.sync_all().await?;
        drop(temp_file);

        let path = BlobPath::allocate();
        let target = self.file_path(&path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(temp_path, &target).await?;

        Ok(StoredBlob {
            path,
            size: total_bytes,
            checksum: ContentHash::from_bytes(hasher.finalize().into()),
        })
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put_stream(&self, reader: BoxReader) -> Result<StoredBlob, StorageError> {
        let temp_path = self.temp_path();
        let result = self.write_staged(&temp_path, reader).await;

        if result.is_err() {
            match fs::remove_file(&temp_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %temp_path.display(), error = %e, "Failed to remove staged write");
                }
            }
        }
        result
    }

    async fn get_stream(&self, path: &BlobPath) -> Result<BoxReader, StorageError> {
        match fs::File::open(self.file_path(path)).await {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, path: &BlobPath) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.file_path(path)).await?)
    }

    async fn delete(&self, path: &BlobPath) -> Result<bool, StorageError> {
        match fs::remove_file(self.file_path(path)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<BlobEntry>, StorageError> {
        let mut entries = Vec::new();
        let mut shards = fs::read_dir(&self.base_path).await?;

        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            let shard_name = shard.file_name().to_string_lossy().into_owned();
            if shard_name == ".tmp" {
                continue;
            }

            let mut files = fs::read_dir(shard.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let relative = format!("{shard_name}/{}", file.file_name().to_string_lossy());
                let Ok(path) = BlobPath::parse(&relative) else {
                    warn!(path = %relative, "Skipping foreign file in blob store");
                    continue;
                };
                let modified: DateTime<Utc> = file.metadata().await?.modified()?.into();
                entries.push(BlobEntry { path, modified });
            }
        }

        Ok(entries)
    }

    async fn reap_staging(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let mut removed = 0;
        let mut staged = fs::read_dir(self.staging_dir()).await?;

        while let Some(file) = staged.next_entry().await? {
            let modified: DateTime<Utc> = file.metadata().await?.modified()?.into();
            if modified > cutoff {
                continue;
            }
            match fs::remove_file(file.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %file.path().display(), error = %e, "Failed to remove stale staged write");
                }
            }
        }

        Ok(removed)
    }
}
