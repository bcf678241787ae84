//! Persistence seams for the two content classes.

pub mod meta;
pub mod text;

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongo;
#[cfg(feature = "sea-orm")]
pub mod sea;

pub use meta::{BlobMetaStore, BlobRecord, NewBlobRecord, UpsertOutcome};
pub use text::{TextDocument, TextStore, TextUpsert};
