use serde::{Deserialize, Serialize};

use crate::mq::Message;
use crate::retry::RetryAttempt;

/// Error codes for dead-lettered messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DlqErrorCode {
    /// All retry attempts exhausted.
    MaxRetriesExceeded,
    /// Undecodable envelope, invalid key or undecodable text.
    MalformedMessage,
}

impl DlqErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            Self::MalformedMessage => "MALFORMED_MESSAGE",
        }
    }
}

impl std::fmt::Display for DlqErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Envelope for transporting failed ingestion messages to the DLQ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEnvelope {
    /// Original message ID.
    pub message_id: String,
    /// `None` when the filename could not be recovered from the payload.
    pub filename: Option<String>,
    /// Full serialized message payload.
    pub payload: serde_json::Value,
    pub error_code: DlqErrorCode,
    pub error_message: String,
    /// History of attempts before reaching the DLQ.
    pub retry_history: Vec<RetryAttempt>,
}

impl Message for DlqEnvelope {
    fn message_type() -> &'static str {
        "ingestion_dlq"
    }

    fn message_id(&self) -> String {
        self.message_id.clone()
    }
}
