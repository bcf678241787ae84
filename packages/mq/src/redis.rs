use async_trait::async_trait;
use broccoli_queue::queue::{BroccoliQueue, RetryStrategy};
use common::mq::MessageEnvelope;
use tracing::debug;

use crate::broker::{Broker, Delivery, Receipt};
use crate::error::MqError;
use crate::topic::queue_name;

/// Broker over Redis, one broccoli queue per topic partition.
///
/// A nacked delivery is republished by broccoli at the tail of its
/// partition, so it can be handed out after messages published later.
pub struct RedisBroker {
    queue: BroccoliQueue,
}

impl RedisBroker {
    pub async fn connect(url: &str, pool_size: u8) -> Result<Self, MqError> {
        // Retry bookkeeping lives in the consumer; broccoli only has to put
        // nacked deliveries back.
        let queue = BroccoliQueue::builder(url)
            .pool_connections(pool_size)
            .failed_message_retry_strategy(RetryStrategy::new().with_attempts(u8::MAX))
            .build()
            .await?;
        Ok(Self { queue })
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn publish(
        &self,
        topic: &str,
        partition: u16,
        envelope: &MessageEnvelope,
    ) -> Result<(), MqError> {
        let queue = queue_name(topic, partition);
        self.queue
            .publish(&queue, None, envelope, None)
            .await
            .map_err(|e| MqError::Publish {
                queue: queue.clone(),
                reason: e.to_string(),
            })?;

        debug!(queue = %queue, message_id = %envelope.message_id, "Published");
        Ok(())
    }

    async fn receive(&self, topic: &str, partition: u16) -> Result<Option<Delivery>, MqError> {
        let queue = queue_name(topic, partition);
        let message = self
            .queue
            .try_consume::<MessageEnvelope>(&queue, None)
            .await
            .map_err(|e| MqError::Consume {
                queue: queue.clone(),
                reason: e.to_string(),
            })?;

        Ok(message.map(|message| Delivery {
            topic: topic.to_string(),
            partition,
            envelope: message.payload.clone(),
            redelivered: message.attempts > 0,
            receipt: Receipt::Redis(message),
        }))
    }

    async fn ack(&self, delivery: Delivery) -> Result<(), MqError> {
        let Receipt::Redis(message) = delivery.receipt else {
            return Err(MqError::AckFailed(
                "receipt was not issued by the redis broker".into(),
            ));
        };

        let queue = queue_name(&delivery.topic, delivery.partition);
        self.queue
            .acknowledge(&queue, message)
            .await
            .map_err(|e| MqError::AckFailed(e.to_string()))
    }

    async fn nack(&self, delivery: Delivery) -> Result<(), MqError> {
        let Receipt::Redis(message) = delivery.receipt else {
            return Err(MqError::AckFailed(
                "receipt was not issued by the redis broker".into(),
            ));
        };

        let queue = queue_name(&delivery.topic, delivery.partition);
        debug!(queue = %queue, message_id = %delivery.envelope.message_id, "Rejecting delivery");
        self.queue
            .reject(&queue, message)
            .await
            .map_err(|e| MqError::AckFailed(e.to_string()))
    }
}
