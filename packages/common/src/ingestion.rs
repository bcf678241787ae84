use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::mq::Message;

/// One accepted upload on its way to durable storage.
///
/// `id` is a UUIDv7, so comparing ids orders messages by publish time. The
/// writer stamps it on the record it produces and skips anything older.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionMessage {
    pub id: Uuid,
    pub filename: String,
    #[serde(with = "hex_bytes")]
    pub payload: Vec<u8>,
    pub owner: Option<Uuid>,
    pub enqueued_at: DateTime<Utc>,
}

impl IngestionMessage {
    pub fn new(filename: impl Into<String>, payload: Vec<u8>, owner: Option<Uuid>) -> Self {
        Self {
            id: Uuid::now_v7(),
            filename: filename.into(),
            payload,
            owner,
            enqueued_at: Utc::now(),
        }
    }
}

impl Message for IngestionMessage {
    fn message_type() -> &'static str {
        "ingestion"
    }

    fn message_id(&self) -> String {
        self.id.to_string()
    }

    fn routing_key(&self) -> Option<&str> {
        Some(&self.filename)
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
