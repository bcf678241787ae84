use serde::Serialize;
use uuid::Uuid;

use crate::content::Accepted;

/// Upload accepted for asynchronous processing. The content becomes
/// readable once the consumer has persisted it.
#[derive(Serialize, utoipa::ToSchema)]
pub struct UploadAcceptedResponse {
    /// Ingestion message id; also the revision the stored content will carry.
    #[schema(example = "01922c8e-6b1a-7cc3-9d5e-0a2f4c1b7e90")]
    pub message_id: Uuid,
    #[schema(example = "report.txt")]
    pub filename: String,
    /// Backend class: `text` or `blob`.
    #[schema(example = "text")]
    pub class: String,
}

impl From<Accepted> for UploadAcceptedResponse {
    fn from(a: Accepted) -> Self {
        Self {
            message_id: a.message_id,
            filename: a.filename,
            class: a.class.as_str().to_string(),
        }
    }
}
