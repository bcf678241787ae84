pub mod broker;
pub mod error;
pub mod memory;
pub mod producer;
pub mod redis;
pub mod subscriber;
pub mod topic;

use std::sync::Arc;

use common::config::{MqAppConfig, MqBackend};
use tracing::info;

pub use broker::{Broker, Delivery};
pub use error::MqError;
pub use memory::MemoryBroker;
pub use producer::Producer;
pub use redis::RedisBroker;
pub use subscriber::Subscriber;
pub use topic::Topic;

/// Connect the broker selected by configuration.
pub async fn init_broker(config: &MqAppConfig) -> Result<Arc<dyn Broker>, MqError> {
    match config.backend {
        MqBackend::Redis => {
            let broker = RedisBroker::connect(&config.url, config.pool_size).await?;
            info!(url = %config.url, partitions = config.partitions, "Connected to Redis broker");
            Ok(Arc::new(broker))
        }
        MqBackend::Memory => {
            info!(partitions = config.partitions, "Using in-process broker");
            Ok(Arc::new(MemoryBroker::new()))
        }
    }
}
