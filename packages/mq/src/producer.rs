use std::sync::Arc;
use std::time::Duration;

use common::mq::{Message, MessageEnvelope};
use tracing::debug;

use crate::broker::Broker;
use crate::error::MqError;
use crate::topic::Topic;

/// Publishes typed messages to a topic, routed by each message's key.
#[derive(Clone)]
pub struct Producer {
    broker: Arc<dyn Broker>,
    topic: Topic,
    timeout: Duration,
}

impl Producer {
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

    /// Publish and wait for the broker to accept the message.
    pub async fn send<M: Message>(&self, message: &M) -> Result<MessageEnvelope, MqError> {
        let envelope = MessageEnvelope::from_message(message)?;
        let partition = self.topic.partition_for(envelope.routing_key.as_deref());

        tokio::time::timeout(
            self.timeout,
            self.broker.publish(self.topic.name(), partition, &envelope),
        )
        .await
        .map_err(|_| MqError::Timeout(self.timeout))??;

        debug!(
            topic = %self.topic.name(),
            partition,
            message_id = %envelope.message_id,
            "Message sent"
        );
        Ok(envelope)
    }
}
