use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, Database, DatabaseConnection,
    DatabaseTransaction, DbErr, EntityTrait, IntoActiveModel, QueryFilter, QuerySelect, Set, TransactionTrait,
};
use tracing::warn;
use uuid::Uuid;

use super::meta::{BlobMetaStore, BlobRecord, NewBlobRecord, UpsertOutcome};
use crate::entity::blob_record;
use crate::error::ContentError;
use crate::storage::{BlobPath, ContentHash};

impl TryFrom<blob_record::Model> for BlobRecord {
    type Error = ContentError;

    fn try_from(model: blob_record::Model) -> Result<Self, Self::Error> {
        let corrupted = |detail: String| ContentError::Corrupted {
            filename: model.filename.clone(),
            detail,
        };
        let file_path = BlobPath::parse(&model.file_path).map_err(|e| corrupted(e.to_string()))?;
        let checksum = ContentHash::from_hex(&model.checksum).map_err(|e| corrupted(e.to_string()))?;

        Ok(Self {
            id: model.id,
            filename: model.filename,
            file_type: model.file_type,
            file_size: model.file_size,
            file_path,
            checksum,
            created_at: model.created_at,
            updated_at: model.updated_at,
            user_id: model.user_id,
            revision: model.revision,
        })
    }
}

/// Open the metadata database and create the `blob_record` table if missing.
pub async fn connect(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url.to_owned());
    opt.max_connections(20)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .sqlx_logging(false);

    let db = Database::connect(opt).await?;
    db.get_schema_registry("common::entity::*").sync(&db).await?;
    Ok(db)
}

/// [`BlobMetaStore`] over the `blob_record` table.
#[derive(Clone)]
pub struct SeaOrmBlobMetaStore {
    db: DatabaseConnection,
}

impl SeaOrmBlobMetaStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Overwrite a row locked by `txn`, unless it already holds a newer revision.
    async fn apply_update(
        txn: DatabaseTransaction,
        existing: blob_record::Model,
        new: NewBlobRecord,
    ) -> Result<UpsertOutcome, ContentError> {
        if existing.revision > new.revision {
            txn.rollback().await?;
            return Ok(UpsertOutcome::Stale(existing.try_into()?));
        }

        let previous_path = existing.file_path.clone();
        let mut active = existing.into_active_model();
        active.file_type = Set(new.file_type);
        active.file_size = Set(new.file_size);
        active.file_path = Set(new.file_path.to_string());
        active.checksum = Set(new.checksum.to_hex());
        active.updated_at = Set(Utc::now());
        active.revision = Set(new.revision);
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        let record = BlobRecord::try_from(updated)?;
        let replaced_path = if previous_path == record.file_path.as_str() {
            None
        } else {
            match BlobPath::parse(&previous_path) {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(filename = %record.filename, error = %e, "Previous blob path is malformed");
                    None
                }
            }
        };

        Ok(UpsertOutcome::Updated {
            record,
            replaced_path,
        })
    }
}

#[async_trait]
impl BlobMetaStore for SeaOrmBlobMetaStore {
    async fn find_by_filename(&self, filename: &str) -> Result<Option<BlobRecord>, ContentError> {
        blob_record::Entity::find()
            .filter(blob_record::Column::Filename.eq(filename))
            .one(&self.db)
            .await?
            .map(BlobRecord::try_from)
            .transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<BlobRecord>, ContentError> {
        blob_record::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(BlobRecord::try_from)
            .transpose()
    }

    async fn upsert(&self, new: NewBlobRecord) -> Result<UpsertOutcome, ContentError> {
        let txn = self.db.begin().await?;

        let existing = blob_record::Entity::find()
            .filter(blob_record::Column::Filename.eq(new.filename.as_str()))
            .lock(LockType::Update)
            .one(&txn)
            .await?;

        let Some(existing) = existing else {
            let now = Utc::now();
            let model = blob_record::ActiveModel {
                id: Set(Uuid::now_v7()),
                filename: Set(new.filename),
                file_type: Set(new.file_type),
                file_size: Set(new.file_size),
                file_path: Set(new.file_path.to_string()),
                checksum: Set(new.checksum.to_hex()),
                created_at: Set(now),
                updated_at: Set(now),
                user_id: Set(new.user_id),
                revision: Set(new.revision),
            };
            let inserted = model.insert(&txn).await?;
            txn.commit().await?;
            return Ok(UpsertOutcome::Inserted(inserted.try_into()?));
        };

        Self::apply_update(txn, existing, new).await
    }

    async fn restamp(&self, new: NewBlobRecord) -> Result<Option<UpsertOutcome>, ContentError> {
        let txn = self.db.begin().await?;

        let existing = blob_record::Entity::find()
            .filter(blob_record::Column::Filename.eq(new.filename.as_str()))
            .lock(LockType::Update)
            .one(&txn)
            .await?;

        match existing {
            Some(existing) if existing.file_path == new.file_path.as_str() => {
                Self::apply_update(txn, existing, new).await.map(Some)
            }
            _ => {
                txn.rollback().await?;
                Ok(None)
            }
        }
    }

    async fn delete_by_filename(
        &self,
        filename: &str,
    ) -> Result<Option<BlobRecord>, ContentError> {
        let txn = self.db.begin().await?;

        let existing = blob_record::Entity::find()
            .filter(blob_record::Column::Filename.eq(filename))
            .lock(LockType::Update)
            .one(&txn)
            .await?;

        let Some(existing) = existing else {
            txn.rollback().await?;
            return Ok(None);
        };

        blob_record::Entity::delete_by_id(existing.id)
            .exec(&txn)
            .await?;
        txn.commit().await?;

        Ok(Some(existing.try_into()?))
    }

    async fn referenced_paths(&self) -> Result<HashSet<BlobPath>, ContentError> {
        let paths: Vec<String> = blob_record::Entity::find()
            .select_only()
            .column(blob_record::Column::FilePath)
            .into_tuple()
            .all(&self.db)
            .await?;

        Ok(paths
            .iter()
            .filter_map(|p| match BlobPath::parse(p) {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(path = %p, error = %e, "Ignoring malformed blob path in metadata");
                    None
                }
            })
            .collect())
    }
}
