use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use common::mq::MessageEnvelope;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::broker::{Broker, Delivery, Receipt};
use crate::error::MqError;

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    envelope: MessageEnvelope,
    delivered: bool,
}

type QueueKey = (String, u16);

#[derive(Debug, Default)]
struct Inner {
    queues: HashMap<QueueKey, VecDeque<Entry>>,
    in_flight: HashMap<u64, (QueueKey, Entry)>,
    next_seq: u64,
}

/// In-process partitioned queue.
///
/// Messages survive only as long as the process. A nacked delivery goes
/// straight back to the head of its partition. Deliveries that are neither
/// acked nor nacked stay in flight until [`MemoryBroker::requeue_unacked`]
/// puts them back, which is what a consumer crash looks like to a durable
/// broker.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    inner: Mutex<Inner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return every unacked delivery to the head of its partition, oldest first.
    pub async fn requeue_unacked(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let mut returning: Vec<_> = inner.in_flight.drain().map(|(_, v)| v).collect();
        returning.sort_by_key(|(_, entry)| std::cmp::Reverse(entry.seq));

        let count = returning.len();
        for (key, entry) in returning {
            inner.queues.entry(key).or_default().push_front(entry);
        }
        if count > 0 {
            info!(count, "Requeued unacknowledged deliveries");
        }
        count
    }

    /// Messages waiting in a partition, not counting in-flight ones.
    pub async fn pending(&self, topic: &str, partition: u16) -> usize {
        self.inner
            .lock()
            .await
            .queues
            .get(&(topic.to_string(), partition))
            .map_or(0, VecDeque::len)
    }

    /// Messages waiting across all partitions of a topic.
    pub async fn pending_in_topic(&self, topic: &str) -> usize {
        self.inner
            .lock()
            .await
            .queues
            .iter()
            .filter(|((name, _), _)| name == topic)
            .map(|(_, q)| q.len())
            .sum()
    }

    pub async fn in_flight(&self) -> usize {
        self.inner.lock().await.in_flight.len()
    }

    /// Remove and return all pending envelopes of a topic, in partition order.
    pub async fn drain_topic(&self, topic: &str) -> Vec<MessageEnvelope> {
        let mut inner = self.inner.lock().await;
        let mut keys: Vec<_> = inner
            .queues
            .keys()
            .filter(|(name, _)| name == topic)
            .cloned()
            .collect();
        keys.sort();

        keys.into_iter()
            .filter_map(|key| inner.queues.remove(&key))
            .flat_map(|q| q.into_iter().map(|e| e.envelope))
            .collect()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(
        &self,
        topic: &str,
        partition: u16,
        envelope: &MessageEnvelope,
    ) -> Result<(), MqError> {
        let mut inner = self.inner.lock().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner
            .queues
            .entry((topic.to_string(), partition))
            .or_default()
            .push_back(Entry {
                seq,
                envelope: envelope.clone(),
                delivered: false,
            });

        debug!(topic, partition, seq, message_id = %envelope.message_id, "Published");
        Ok(())
    }

    async fn receive(&self, topic: &str, partition: u16) -> Result<Option<Delivery>, MqError> {
        let mut inner = self.inner.lock().await;
        let key = (topic.to_string(), partition);

        let Some(mut entry) = inner.queues.get_mut(&key).and_then(VecDeque::pop_front) else {
            return Ok(None);
        };

        let redelivered = entry.delivered;
        entry.delivered = true;
        let delivery = Delivery {
            topic: topic.to_string(),
            partition,
            envelope: entry.envelope.clone(),
            redelivered,
            receipt: Receipt::Memory(entry.seq),
        };
        inner.in_flight.insert(entry.seq, (key, entry));

        Ok(Some(delivery))
    }

    async fn ack(&self, delivery: Delivery) -> Result<(), MqError> {
        let Receipt::Memory(seq) = delivery.receipt else {
            return Err(MqError::AckFailed(
                "receipt was not issued by the memory broker".into(),
            ));
        };

        match self.inner.lock().await.in_flight.remove(&seq) {
            Some(_) => Ok(()),
            None => Err(MqError::AckFailed(format!("delivery {seq} is not in flight"))),
        }
    }

    async fn nack(&self, delivery: Delivery) -> Result<(), MqError> {
        let Receipt::Memory(seq) = delivery.receipt else {
            return Err(MqError::AckFailed(
                "receipt was not issued by the memory broker".into(),
            ));
        };

        let mut inner = self.inner.lock().await;
        let Some((key, entry)) = inner.in_flight.remove(&seq) else {
            return Err(MqError::AckFailed(format!("delivery {seq} is not in flight")));
        };
        debug!(topic = %key.0, partition = key.1, seq, "Returned delivery to queue");
        inner.queues.entry(key).or_default().push_front(entry);
        Ok(())
    }
}
