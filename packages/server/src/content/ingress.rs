use common::filename::validate_flat_filename;
use common::{ContentError, IngestionMessage, StorageClass, classify};
use mq::Producer;
use tracing::info;
use uuid::Uuid;

/// An upload handed to the ingestion queue. Not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub message_id: Uuid,
    pub filename: String,
    pub class: StorageClass,
}

/// Validates uploads and publishes them for asynchronous persistence.
#[derive(Clone)]
pub struct IngressGateway {
    producer: Producer,
    max_payload_size: u64,
}

impl IngressGateway {
    pub fn new(producer: Producer, max_payload_size: u64) -> Self {
        Self {
            producer,
            max_payload_size,
        }
    }

    pub fn max_payload_size(&self) -> u64 {
        self.max_payload_size
    }

    /// Returns once the broker has accepted the message.
    pub async fn submit_upload(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        owner: Option<Uuid>,
    ) -> Result<Accepted, ContentError> {
        let filename = validate_flat_filename(filename)
            .map_err(|e| ContentError::Validation(e.to_string()))?;

        let size = bytes.len() as u64;
        if size > self.max_payload_size {
            return Err(ContentError::PayloadTooLarge {
                actual: size,
                limit: self.max_payload_size,
            });
        }

        let class = classify(filename);
        if class == StorageClass::Text && std::str::from_utf8(&bytes).is_err() {
            return Err(ContentError::Validation(
                "Text uploads must be valid UTF-8".into(),
            ));
        }

        let message = IngestionMessage::new(filename, bytes, owner);
        self.producer.send(&message).await?;

        info!(
            filename = %message.filename,
            message_id = %message.id,
            class = %class,
            size,
            "Upload accepted"
        );

        Ok(Accepted {
            message_id: message.id,
            filename: message.filename,
            class,
        })
    }
}
