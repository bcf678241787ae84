pub mod classify;
pub mod config;
pub mod dlq;
#[cfg(feature = "sea-orm")]
pub mod entity;
pub mod error;
pub mod filename;
pub mod ingestion;
pub mod mq;
pub mod retry;
pub mod storage;
pub mod store;
pub mod timeout;

pub use classify::{StorageClass, classify, content_type_for};
pub use dlq::{DlqEnvelope, DlqErrorCode};
pub use error::ContentError;
pub use ingestion::IngestionMessage;
