pub mod ingestion_dlq;

pub use ingestion_dlq::DlqSink;
