use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Metadata for one blob upload; the bytes live in the blob store at `file_path`.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "blob_record")]
pub struct Model {
    /// UUIDv7 primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub filename: String,

    /// MIME type guessed from the filename.
    pub file_type: String,

    pub file_size: i64,

    #[sea_orm(unique)]
    pub file_path: String,

    /// SHA-256 hex.
    pub checksum: String,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,

    #[sea_orm(indexed)]
    pub user_id: Option<Uuid>,

    /// Id of the ingestion message that last wrote this row.
    pub revision: Uuid,
}

impl ActiveModelBehavior for ActiveModel {}
