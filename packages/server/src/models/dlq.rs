use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::dead_letter_message;

use super::shared::Pagination;

/// Query parameters for listing DLQ messages.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListDlqParams {
    /// Filter by resolved status.
    #[param(example = false)]
    pub resolved: Option<bool>,
    /// Page number (1-indexed).
    #[param(example = 1)]
    pub page: Option<u64>,
    /// Items per page (1-100, default 20).
    #[param(example = 20)]
    pub per_page: Option<u64>,
}

/// DLQ message summary for list views.
#[derive(Serialize, utoipa::ToSchema)]
pub struct DlqMessageResponse {
    #[schema(example = 1)]
    pub id: i32,
    #[schema(example = "01922c8e-6b1a-7cc3-9d5e-0a2f4c1b7e90")]
    pub message_id: String,
    /// Content key (null if the payload could not be decoded).
    #[schema(example = "photo.png")]
    pub filename: Option<String>,
    #[schema(example = "MAX_RETRIES_EXCEEDED")]
    pub error_code: String,
    #[schema(example = "backend unavailable: metadata store: connection refused")]
    pub error_message: String,
    #[schema(example = 3)]
    pub retry_count: i32,
    #[schema(example = "2025-09-01T08:00:00Z")]
    pub first_failed_at: DateTime<Utc>,
    #[schema(example = "2025-09-01T08:05:00Z")]
    pub created_at: DateTime<Utc>,
    #[schema(example = false)]
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<Uuid>,
}

impl From<dead_letter_message::Model> for DlqMessageResponse {
    fn from(m: dead_letter_message::Model) -> Self {
        Self {
            id: m.id,
            message_id: m.message_id,
            filename: m.filename,
            error_code: m.error_code,
            error_message: m.error_message,
            retry_count: m.retry_count,
            first_failed_at: m.first_failed_at,
            created_at: m.created_at,
            resolved: m.resolved,
            resolved_at: m.resolved_at,
            resolved_by: m.resolved_by,
        }
    }
}

/// Full DLQ message details.
#[derive(Serialize, utoipa::ToSchema)]
pub struct DlqMessageDetailResponse {
    #[schema(example = 1)]
    pub id: i32,
    #[schema(example = "01922c8e-6b1a-7cc3-9d5e-0a2f4c1b7e90")]
    pub message_id: String,
    #[schema(example = "photo.png")]
    pub filename: Option<String>,
    /// The original ingestion message, payload bytes hex-encoded.
    pub payload: serde_json::Value,
    #[schema(example = "MAX_RETRIES_EXCEEDED")]
    pub error_code: String,
    pub error_message: String,
    #[schema(example = 3)]
    pub retry_count: i32,
    /// Retry history: array of {attempt, error, timestamp}.
    pub retry_history: serde_json::Value,
    pub first_failed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<Uuid>,
}

impl From<dead_letter_message::Model> for DlqMessageDetailResponse {
    fn from(m: dead_letter_message::Model) -> Self {
        Self {
            id: m.id,
            message_id: m.message_id,
            filename: m.filename,
            payload: m.payload,
            error_code: m.error_code,
            error_message: m.error_message,
            retry_count: m.retry_count,
            retry_history: m.retry_history,
            first_failed_at: m.first_failed_at,
            created_at: m.created_at,
            resolved: m.resolved,
            resolved_at: m.resolved_at,
            resolved_by: m.resolved_by,
        }
    }
}

/// Paginated list of DLQ messages.
#[derive(Serialize, utoipa::ToSchema)]
pub struct DlqListResponse {
    pub data: Vec<DlqMessageResponse>,
    pub pagination: Pagination,
}
