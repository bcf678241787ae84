use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, error};

/// Core trait for all queued messages.
pub trait Message: Serialize + DeserializeOwned + Debug + Send + Sync + Clone {
    fn message_type() -> &'static str
    where
        Self: Sized;

    fn message_id(&self) -> String;

    /// Partitioning key. Messages sharing a key are delivered in publish order.
    fn routing_key(&self) -> Option<&str> {
        None
    }
}

/// Message envelope for transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub message_type: String,
    pub message_id: String,
    pub routing_key: Option<String>,
    pub published_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Message type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },
}

impl MessageEnvelope {
    pub fn from_message<M: Message>(message: &M) -> Result<Self, EnvelopeError> {
        let message_type = M::message_type().to_string();
        let message_id = message.message_id();
        let routing_key = message.routing_key().map(str::to_string);

        debug!(
            message_type = %message_type,
            message_id = %message_id,
            routing_key = ?routing_key,
            "Creating message envelope"
        );

        Ok(Self {
            message_type,
            message_id,
            routing_key,
            published_at: Utc::now(),
            payload: serde_json::to_value(message)?,
        })
    }

    /// Deserialize into a typed message.
    pub fn open<M: Message>(&self) -> Result<M, EnvelopeError> {
        if self.message_type != M::message_type() {
            error!(
                expected = M::message_type(),
                actual = %self.message_type,
                message_id = %self.message_id,
                "Message type mismatch"
            );
            return Err(EnvelopeError::TypeMismatch {
                expected: M::message_type().to_string(),
                actual: self.message_type.clone(),
            });
        }

        serde_json::from_value(self.payload.clone()).map_err(|e| {
            error!(error = %e, message_id = %self.message_id, "Deserialization failed");
            EnvelopeError::Serialization(e)
        })
    }
}
