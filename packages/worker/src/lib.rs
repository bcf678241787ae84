pub mod config;
pub mod consumer;
pub mod error;
pub mod reconcile;
pub mod writer;

pub use config::{WorkerAppConfig, WorkerConfig};
pub use consumer::{IngestState, IngestionConsumer, Settled};
pub use error::{Result, WorkerError};
pub use reconcile::{OrphanSweeper, SweepReport};
pub use writer::{Committed, DurableWriter};
