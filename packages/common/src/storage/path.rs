use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::StorageError;

/// Opaque handle into the bytes store: `{2 hex shard}/{32 hex id}`.
///
/// Paths are allocated by the store and never derived from the filename, so a
/// re-upload writes new bytes next to the old ones instead of overwriting them.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlobPath(String);

impl BlobPath {
    /// Allocate a fresh, never-used path.
    pub fn allocate() -> Self {
        let id = Uuid::now_v7().simple().to_string();
        // The tail of a v7 id is random; the head is the timestamp.
        let shard = &id[id.len() - 2..];
        Self(format!("{shard}/{id}"))
    }

    /// Validate a path read back from metadata.
    pub fn parse(s: &str) -> Result<Self, StorageError> {
        let (shard, name) = s
            .split_once('/')
            .ok_or_else(|| StorageError::InvalidPath(format!("missing shard in '{s}'")))?;

        let is_hex = |part: &str| part.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));

        if shard.len() != 2 || !is_hex(shard) {
            return Err(StorageError::InvalidPath(format!("bad shard in '{s}'")));
        }
        if name.len() != 32 || !is_hex(name) {
            return Err(StorageError::InvalidPath(format!("bad name in '{s}'")));
        }
        if !name.ends_with(shard) {
            return Err(StorageError::InvalidPath(format!("shard mismatch in '{s}'")));
        }

        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn shard(&self) -> &str {
        &self.0[..2]
    }

    pub fn name(&self) -> &str {
        &self.0[3..]
    }
}

impl fmt::Debug for BlobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobPath({})", self.0)
    }
}

impl fmt::Display for BlobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BlobPath {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BlobPath> for String {
    fn from(path: BlobPath) -> Self {
        path.0
    }
}
