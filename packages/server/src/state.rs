use std::sync::Arc;

use common::storage::BlobStore;
use common::store::{BlobMetaStore, TextStore};
use mq::{Broker, Producer, Topic};
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::content::{ContentRouter, IngressGateway};
use crate::utils::jwt::JwtKeys;

/// Connected backends, shared by the HTTP surface and an embedded consumer.
#[derive(Clone)]
pub struct Backends {
    pub text: Arc<dyn TextStore>,
    pub meta: Arc<dyn BlobMetaStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub broker: Arc<dyn Broker>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: DatabaseConnection,
    pub gateway: IngressGateway,
    pub router: ContentRouter,
    pub jwt: Arc<JwtKeys>,
}

impl AppState {
    pub fn new(config: AppConfig, db: DatabaseConnection, backends: &Backends) -> Self {
        let call_timeout = config.storage.call_timeout();
        let producer = Producer::new(
            backends.broker.clone(),
            Topic::new(&config.mq.topic, config.mq.partitions),
            call_timeout,
        );

        Self {
            gateway: IngressGateway::new(producer, config.storage.max_payload_size),
            router: ContentRouter::new(
                backends.text.clone(),
                backends.meta.clone(),
                backends.blobs.clone(),
                call_timeout,
            ),
            jwt: Arc::new(JwtKeys::from_config(&config.auth)),
            config,
            db,
        }
    }
}
