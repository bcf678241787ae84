use async_trait::async_trait;
use bson::doc;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, IndexModel};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::text::{TextDocument, TextStore, TextUpsert};
use crate::config::MongoConfig;
use crate::error::ContentError;

/// Stored shape of a text document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TextRow {
    filename: String,
    text: String,
    #[serde(rename = "createdAt")]
    created_at: bson::DateTime,
    revision: String,
}

impl TryFrom<TextRow> for TextDocument {
    type Error = ContentError;

    fn try_from(row: TextRow) -> Result<Self, Self::Error> {
        let revision = Uuid::parse_str(&row.revision).map_err(|e| ContentError::Corrupted {
            filename: row.filename.clone(),
            detail: format!("bad revision: {e}"),
        })?;
        Ok(Self {
            filename: row.filename,
            text: row.text,
            created_at: row.created_at.to_chrono(),
            revision,
        })
    }
}

const DUPLICATE_KEY: i32 = 11000;

const UPSERT_ATTEMPTS: usize = 3;

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    match e.kind.as_ref() {
        ErrorKind::Command(err) => err.code == DUPLICATE_KEY,
        ErrorKind::Write(WriteFailure::WriteError(err)) => err.code == DUPLICATE_KEY,
        _ => false,
    }
}

/// [`TextStore`] backed by a MongoDB collection with a unique `filename` index.
#[derive(Clone)]
pub struct MongoTextStore {
    client: Client,
    database: String,
    collection: Collection<TextRow>,
}

impl MongoTextStore {
    pub async fn connect(config: &MongoConfig) -> Result<Self, ContentError> {
        info!(database = %config.database, collection = %config.collection, "Connecting to MongoDB");

        let client = Client::with_uri_str(&config.uri).await?;
        let collection = client
            .database(&config.database)
            .collection::<TextRow>(&config.collection);

        let store = Self {
            client,
            database: config.database.clone(),
            collection,
        };
        store.ping().await?;
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> Result<(), ContentError> {
        let index = IndexModel::builder()
            .keys(doc! { "filename": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.collection.create_index(index).await?;
        Ok(())
    }
}

#[async_trait]
impl TextStore for MongoTextStore {
    async fn get(&self, filename: &str) -> Result<Option<TextDocument>, ContentError> {
        self.collection
            .find_one(doc! { "filename": filename })
            .await?
            .map(TextDocument::try_from)
            .transpose()
    }

    async fn upsert(
        &self,
        filename: &str,
        text: &str,
        revision: Uuid,
    ) -> Result<TextUpsert, ContentError> {
        // Hyphenated lowercase UUIDv7 strings sort in revision order, so the
        // guard runs inside the server-side update.
        let filter = doc! { "filename": filename, "revision": { "$lte": revision.to_string() } };
        let update = doc! {
            "$set": { "text": text, "revision": revision.to_string() },
            "$setOnInsert": { "createdAt": bson::DateTime::now() },
        };

        for _ in 0..UPSERT_ATTEMPTS {
            let written = self
                .collection
                .find_one_and_update(filter.clone(), update.clone())
                .upsert(true)
                .return_document(ReturnDocument::After)
                .await;

            match written {
                Ok(Some(row)) => return Ok(TextUpsert::Written(row.try_into()?)),
                Ok(None) => {}
                // The filter missed an existing document and the insert hit
                // the unique filename index.
                Err(e) if is_duplicate_key(&e) => {
                    if let Some(current) = self.get(filename).await? {
                        if current.revision > revision {
                            return Ok(TextUpsert::Stale(current));
                        }
                    }
                    debug!(filename, revision = %revision, "Text upsert raced another writer, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ContentError::Unavailable(format!(
            "text upsert for '{filename}' kept racing concurrent writers"
        )))
    }

    async fn delete(&self, filename: &str) -> Result<bool, ContentError> {
        let result = self
            .collection
            .delete_one(doc! { "filename": filename })
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn ping(&self) -> Result<(), ContentError> {
        self.client
            .database(&self.database)
            .run_command(doc! { "ping": 1 })
            .await?;
        Ok(())
    }
}
