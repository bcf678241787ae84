use std::sync::Arc;
use std::time::Duration;

use common::mq::MessageEnvelope;
use common::retry::{RetryAttempt, RetryCleanupGuard, RetryDecision, RetryPolicy, RetryTracker};
use common::{ContentError, DlqEnvelope, DlqErrorCode, IngestionMessage, classify};
use mq::{Delivery, Producer, Subscriber};
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::writer::{Committed, DurableWriter};

/// Lifecycle of one dequeued message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Received,
    Classified,
    Persisting,
    Committed,
    FailedRetryable,
    FailedPoison,
}

/// How a delivery was settled. Either way it has been acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    Committed(Committed),
    DeadLettered(DlqErrorCode),
}

/// Drains the ingestion topic, one sequential loop per partition.
pub struct IngestionConsumer {
    source: Subscriber,
    writer: DurableWriter,
    dlq: Producer,
    policy: RetryPolicy,
    poll_interval: Duration,
    tracker: Arc<Mutex<RetryTracker>>,
}

impl IngestionConsumer {
    pub fn new(
        source: Subscriber,
        writer: DurableWriter,
        dlq: Producer,
        policy: RetryPolicy,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            writer,
            dlq,
            policy,
            poll_interval,
            tracker: Arc::new(Mutex::new(RetryTracker::new(policy.max_attempts))),
        }
    }

    pub fn retry_tracker(&self) -> Arc<Mutex<RetryTracker>> {
        self.tracker.clone()
    }

    /// Run every partition loop until `shutdown` flips to `true`.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        info!(
            topic = %self.source.topic().name(),
            partitions = self.source.topic().partitions(),
            max_attempts = self.policy.max_attempts,
            "Starting ingestion consumer"
        );

        let handles: Vec<_> = (0..self.source.topic().partitions())
            .map(|partition| {
                let consumer = Arc::clone(&self);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { consumer.partition_loop(partition, shutdown).await })
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Partition loop panicked");
            }
        }
        info!("Ingestion consumer stopped");
    }

    async fn partition_loop(self: Arc<Self>, partition: u16, mut shutdown: watch::Receiver<bool>) {
        debug!(partition, "Partition loop started");

        while !*shutdown.borrow() {
            let delivery = match self.source.receive(partition).await {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                    continue;
                }
                Err(e) => {
                    warn!(partition, error = %e, "Receive failed");
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
            };

            // Processing runs on its own task so stopping the loop never
            // abandons a message halfway through a write.
            let consumer = Arc::clone(&self);
            let task = tokio::spawn(async move { consumer.settle(delivery).await });
            match task.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    error!(partition, error = %e, "Delivery left unacknowledged for redelivery");
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) => error!(partition, error = %e, "Processing task panicked"),
            }
        }

        debug!(partition, "Partition loop stopped");
    }

    /// Process everything currently queued on one partition, in order.
    pub async fn drain_partition(&self, partition: u16) -> Result<Vec<Settled>> {
        let mut settled = Vec::new();
        while let Some(delivery) = self.source.receive(partition).await? {
            settled.push(self.settle(delivery).await?);
        }
        Ok(settled)
    }

    /// Drain every partition once.
    pub async fn drain(&self) -> Result<Vec<Settled>> {
        let mut settled = Vec::new();
        for partition in 0..self.source.topic().partitions() {
            settled.extend(self.drain_partition(partition).await?);
        }
        Ok(settled)
    }

    /// Process one delivery to a terminal state and acknowledge it.
    ///
    /// Returns an error only when a poison message could not be handed to
    /// the dead-letter topic. The delivery is then nacked so it is processed
    /// again ahead of later messages on its partition.
    pub async fn settle(&self, delivery: Delivery) -> Result<Settled> {
        let outcome = self.process(&delivery.envelope, delivery.redelivered).await;

        let settled = match outcome {
            Ok(committed) => Settled::Committed(committed),
            Err(dead) => {
                let code = dead.error_code;
                if let Err(e) = self.dlq.send(&dead).await {
                    error!(message_id = %dead.message_id, error = %e, "Failed to publish to DLQ");
                    if let Err(nack_err) = self.source.nack(delivery).await {
                        warn!(message_id = %dead.message_id, error = %nack_err, "Nack failed, delivery waits for broker redelivery");
                    }
                    return Err(e.into());
                }
                Settled::DeadLettered(code)
            }
        };

        self.source.ack(delivery).await?;
        Ok(settled)
    }

    /// Run the state machine. `Err` carries the envelope to dead-letter.
    async fn process(
        &self,
        envelope: &MessageEnvelope,
        redelivered: bool,
    ) -> std::result::Result<Committed, DlqEnvelope> {
        let message_id = envelope.message_id.clone();
        let mut state = IngestState::Received;
        debug!(message_id = %message_id, redelivered, ?state, "Ingestion message received");

        let msg: IngestionMessage = match envelope.open() {
            Ok(msg) => msg,
            Err(e) => {
                state = IngestState::FailedPoison;
                error!(message_id = %message_id, ?state, error = %e, "Malformed ingestion message");
                return Err(DlqEnvelope {
                    message_id,
                    filename: envelope
                        .payload
                        .get("filename")
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                    payload: envelope.payload.clone(),
                    error_code: DlqErrorCode::MalformedMessage,
                    error_message: format!("Failed to decode ingestion message: {e}"),
                    retry_history: vec![],
                });
            }
        };

        let class = classify(&msg.filename);
        state = IngestState::Classified;
        debug!(message_id = %message_id, filename = %msg.filename, %class, ?state, "Classified");

        let mut cleanup_guard = RetryCleanupGuard::new(self.tracker.clone(), message_id.clone());

        loop {
            state = IngestState::Persisting;
            debug!(message_id = %message_id, ?state, "Persisting");

            let err = match self.writer.persist(&msg).await {
                Ok(committed) => {
                    state = IngestState::Committed;
                    self.tracker.lock().await.clear(&message_id);
                    cleanup_guard.defuse();
                    info!(message_id = %message_id, filename = %msg.filename, ?committed, ?state, "Ingestion committed");
                    return Ok(committed);
                }
                Err(e) => e,
            };

            if !err.is_transient() {
                state = IngestState::FailedPoison;
                self.tracker.lock().await.clear(&message_id);
                cleanup_guard.defuse();
                error!(message_id = %message_id, filename = %msg.filename, ?state, error = %err, "Poison message");
                return Err(self.dead_letter(
                    &msg,
                    envelope,
                    DlqErrorCode::MalformedMessage,
                    &err,
                    vec![RetryAttempt::new(1, err.to_string())],
                ));
            }

            state = IngestState::FailedRetryable;
            let decision = self
                .tracker
                .lock()
                .await
                .record_failure(&message_id, &err.to_string());

            match decision {
                RetryDecision::Retry { attempt, .. } => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        message_id = %message_id,
                        filename = %msg.filename,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        ?state,
                        error = %err,
                        "Retrying ingestion"
                    );
                    tokio::time::sleep(delay).await;
                    state = IngestState::Received;
                    debug!(message_id = %message_id, ?state, "Re-entering after backoff");
                }
                RetryDecision::Exhausted { history } => {
                    state = IngestState::FailedPoison;
                    cleanup_guard.defuse();
                    error!(
                        message_id = %message_id,
                        filename = %msg.filename,
                        retry_count = history.len(),
                        ?state,
                        error = %err,
                        "Max attempts exhausted, sending to DLQ"
                    );
                    return Err(self.dead_letter(
                        &msg,
                        envelope,
                        DlqErrorCode::MaxRetriesExceeded,
                        &err,
                        history,
                    ));
                }
            }
        }
    }

    fn dead_letter(
        &self,
        msg: &IngestionMessage,
        envelope: &MessageEnvelope,
        error_code: DlqErrorCode,
        err: &ContentError,
        retry_history: Vec<RetryAttempt>,
    ) -> DlqEnvelope {
        DlqEnvelope {
            message_id: msg.id.to_string(),
            filename: Some(msg.filename.clone()),
            payload: envelope.payload.clone(),
            error_code,
            error_message: err.to_string(),
            retry_history,
        }
    }
}
