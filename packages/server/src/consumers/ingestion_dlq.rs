use std::time::Duration;

use common::{DlqEnvelope, DlqErrorCode};
use mq::{Delivery, MqError, Subscriber};
use sea_orm::{DatabaseConnection, DbErr, TransactionTrait};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::dlq::DlqService;
use crate::entity::dead_letter_message;

/// Moves dead-lettered ingestion messages from the DLQ topic into the
/// `dead_letter_message` table.
#[derive(Clone)]
pub struct DlqSink {
    db: DatabaseConnection,
    source: Subscriber,
}

#[derive(Debug)]
enum SinkError {
    Mq(MqError),
    Db(DbErr),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mq(e) => write!(f, "broker: {e}"),
            Self::Db(e) => write!(f, "database: {e}"),
        }
    }
}

impl DlqSink {
    pub fn new(db: DatabaseConnection, source: Subscriber) -> Self {
        Self { db, source }
    }

    /// Persist everything currently on the topic. Returns how many
    /// envelopes were stored.
    pub async fn drain(&self) -> Result<usize, MqError> {
        let mut stored = 0;
        for partition in 0..self.source.topic().partitions() {
            while let Some(delivery) = self.source.receive(partition).await? {
                match self.handle(delivery).await {
                    Ok(()) => stored += 1,
                    Err(SinkError::Mq(e)) => return Err(e),
                    Err(SinkError::Db(e)) => {
                        // Nacked; the next drain picks it up again.
                        warn!(error = %e, "DLQ entry not persisted");
                        break;
                    }
                }
            }
        }
        Ok(stored)
    }

    /// Poll the topic until `shutdown` flips to `true`.
    pub async fn run(self, poll_interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(topic = %self.source.topic().name(), "Starting ingestion DLQ consumer");

        while !*shutdown.borrow() {
            match self.drain().await {
                Ok(n) if n > 0 => info!(stored = n, "Persisted DLQ envelopes"),
                Ok(_) => {}
                Err(e) => error!(error = %e, "DLQ receive failed"),
            }
            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        info!("Ingestion DLQ consumer stopped");
    }

    async fn handle(&self, delivery: Delivery) -> Result<(), SinkError> {
        let envelope: DlqEnvelope = match delivery.envelope.open() {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    message_id = %delivery.envelope.message_id,
                    error = %e,
                    "Storing undecodable DLQ envelope as-is"
                );
                DlqEnvelope {
                    message_id: delivery.envelope.message_id.clone(),
                    filename: None,
                    payload: delivery.envelope.payload.clone(),
                    error_code: DlqErrorCode::MalformedMessage,
                    error_message: e.to_string(),
                    retry_history: Vec::new(),
                }
            }
        };

        let row = match self.persist(&envelope).await {
            Ok(row) => row,
            Err(e) => {
                if let Err(nack_err) = self.source.nack(delivery).await {
                    warn!(message_id = %envelope.message_id, error = %nack_err, "Nack failed, delivery waits for broker redelivery");
                }
                return Err(SinkError::Db(e));
            }
        };

        self.source.ack(delivery).await.map_err(SinkError::Mq)?;

        info!(
            id = row.id,
            message_id = %envelope.message_id,
            filename = ?envelope.filename,
            error_code = %envelope.error_code,
            "Persisted ingestion DLQ envelope"
        );
        Ok(())
    }

    async fn persist(&self, envelope: &DlqEnvelope) -> Result<dead_letter_message::Model, DbErr> {
        let txn = self.db.begin().await?;
        let row = DlqService::new(&txn).send_to_dlq(envelope).await?;
        txn.commit().await?;
        Ok(row)
    }
}
