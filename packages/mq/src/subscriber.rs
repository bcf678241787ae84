use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::broker::{Broker, Delivery};
use crate::error::MqError;
use crate::topic::Topic;

/// Pulls deliveries from the partitions of a topic.
///
/// Every broker call is bounded by the same timeout as [`crate::Producer::send`],
/// so a stalled broker surfaces as [`MqError::Timeout`] instead of a hung loop.
#[derive(Clone)]
pub struct Subscriber {
    broker: Arc<dyn Broker>,
    topic: Topic,
    timeout: Duration,
}

impl Subscriber {
    pub fn new(broker: Arc<dyn Broker>, topic: Topic, timeout: Duration) -> Self {
        Self {
            broker,
            topic,
            timeout,
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Take the next message of `partition` without waiting for one to arrive.
    pub async fn receive(&self, partition: u16) -> Result<Option<Delivery>, MqError> {
        self.bounded(self.broker.receive(self.topic.name(), partition))
            .await
    }

    pub async fn ack(&self, delivery: Delivery) -> Result<(), MqError> {
        self.bounded(self.broker.ack(delivery)).await
    }

    pub async fn nack(&self, delivery: Delivery) -> Result<(), MqError> {
        self.bounded(self.broker.nack(delivery)).await
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, MqError>>,
    ) -> Result<T, MqError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| MqError::Timeout(self.timeout))?
    }
}
