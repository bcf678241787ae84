use std::fmt;

use async_trait::async_trait;
use broccoli_queue::brokers::broker::BrokerMessage;
use common::mq::MessageEnvelope;

use crate::error::MqError;

/// Backend handle needed to acknowledge one delivery.
pub enum Receipt {
    Memory(u64),
    Redis(BrokerMessage<MessageEnvelope>),
}

impl fmt::Debug for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory(seq) => write!(f, "Receipt::Memory({seq})"),
            Self::Redis(msg) => write!(f, "Receipt::Redis({})", msg.task_id),
        }
    }
}

/// A message handed to a consumer, pending acknowledgment.
#[derive(Debug)]
pub struct Delivery {
    pub topic: String,
    pub partition: u16,
    pub envelope: MessageEnvelope,
    /// Whether this message was handed out before without being acked.
    pub redelivered: bool,
    pub(crate) receipt: Receipt,
}

/// At-least-once, per-partition FIFO message transport.
///
/// Each partition of a topic is an independent queue. A delivery that is
/// never acked is handed out again, ahead of anything published after it.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        partition: u16,
        envelope: &MessageEnvelope,
    ) -> Result<(), MqError>;

    /// Take the next message of a partition without waiting.
    async fn receive(&self, topic: &str, partition: u16) -> Result<Option<Delivery>, MqError>;

    async fn ack(&self, delivery: Delivery) -> Result<(), MqError>;

    /// Give a delivery back without processing it, so it is handed out again.
    async fn nack(&self, delivery: Delivery) -> Result<(), MqError>;
}
