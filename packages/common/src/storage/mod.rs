mod error;
mod hash;
mod path;
mod traits;

pub mod filesystem;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;

pub use error::StorageError;
pub use filesystem::FilesystemBlobStore;
pub use hash::ContentHash;
pub use path::BlobPath;
pub use traits::{BlobEntry, BlobStore, BoxReader, StoredBlob};
