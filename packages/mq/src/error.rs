use std::time::Duration;

use common::ContentError;
use common::mq::EnvelopeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MqError {
    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Publish to '{queue}' failed: {reason}")]
    Publish { queue: String, reason: String },

    #[error("Consume from '{queue}' failed: {reason}")]
    Consume { queue: String, reason: String },

    #[error("Acknowledgment failed: {0}")]
    AckFailed(String),

    #[error("Broker call timed out after {0:?}")]
    Timeout(Duration),
}

impl From<broccoli_queue::error::BroccoliError> for MqError {
    fn from(e: broccoli_queue::error::BroccoliError) -> Self {
        MqError::Connection(e.to_string())
    }
}

impl From<MqError> for ContentError {
    fn from(e: MqError) -> Self {
        match e {
            MqError::Timeout(limit) => ContentError::Timeout(limit),
            MqError::Envelope(inner) => ContentError::Validation(inner.to_string()),
            other => ContentError::Unavailable(other.to_string()),
        }
    }
}
