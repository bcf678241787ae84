use serde::Deserialize;

/// Which broker implementation backs the ingestion queue.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MqBackend {
    Redis,
    /// In-process queue; only reachable by consumers in the same process.
    Memory,
}

/// Ingestion queue configuration, shared by server and worker.
#[derive(Debug, Deserialize, Clone)]
pub struct MqAppConfig {
    #[serde(default = "default_mq_backend")]
    pub backend: MqBackend,
    /// Redis connection URL. Default: "redis://localhost:6379".
    #[serde(default = "default_mq_url")]
    pub url: String,
    #[serde(default = "default_mq_pool_size")]
    pub pool_size: u8,
    /// Topic for ingestion messages (server publishes, worker consumes).
    #[serde(default = "default_mq_topic")]
    pub topic: String,
    /// Topic for poison messages (worker publishes, server consumes).
    #[serde(default = "default_mq_dlq_topic")]
    pub dlq_topic: String,
    /// Number of key partitions. Changing it reshuffles keys, so drain first.
    #[serde(default = "default_mq_partitions")]
    pub partitions: u16,
    /// Sleep between empty polls of a partition.
    #[serde(default = "default_mq_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_mq_backend() -> MqBackend {
    MqBackend::Redis
}
fn default_mq_url() -> String {
    "redis://localhost:6379".into()
}
fn default_mq_pool_size() -> u8 {
    5
}
fn default_mq_topic() -> String {
    "ingestion".into()
}
fn default_mq_dlq_topic() -> String {
    "ingestion_dlq".into()
}
fn default_mq_partitions() -> u16 {
    8
}
fn default_mq_poll_interval_ms() -> u64 {
    200
}

impl Default for MqAppConfig {
    fn default() -> Self {
        Self {
            backend: default_mq_backend(),
            url: default_mq_url(),
            pool_size: default_mq_pool_size(),
            topic: default_mq_topic(),
            dlq_topic: default_mq_dlq_topic(),
            partitions: default_mq_partitions(),
            poll_interval_ms: default_mq_poll_interval_ms(),
        }
    }
}

/// Retry and dead-letter policy for the ingestion consumer.
#[derive(Debug, Deserialize, Clone)]
pub struct DlqConfig {
    /// Total processing attempts before a message is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u8,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_retry_cleanup_interval_secs")]
    pub retry_cleanup_interval_secs: u64,
    #[serde(default = "default_retry_max_age_secs")]
    pub retry_max_age_secs: u64,
}

fn default_max_attempts() -> u8 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    10_000
}
fn default_retry_cleanup_interval_secs() -> u64 {
    60
}
fn default_retry_max_age_secs() -> u64 {
    600
}

impl Default for DlqConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            retry_cleanup_interval_secs: default_retry_cleanup_interval_secs(),
            retry_max_age_secs: default_retry_max_age_secs(),
        }
    }
}

/// Bytes store and per-call limits.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_blob_dir")]
    pub blob_dir: String,
    /// Largest accepted upload, in bytes. Default: 10 MiB.
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: u64,
    /// Upper bound on any single backend or broker call.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_blob_dir() -> String {
    "./data/blobs".into()
}
fn default_max_payload_size() -> u64 {
    10 * 1024 * 1024
}
fn default_call_timeout_ms() -> u64 {
    5000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            blob_dir: default_blob_dir(),
            max_payload_size: default_max_payload_size(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl StorageConfig {
    pub fn call_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.call_timeout_ms)
    }
}

/// Relational database holding blob metadata.
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Document database holding text content.
#[derive(Debug, Deserialize, Clone)]
pub struct MongoConfig {
    #[serde(default = "default_mongo_uri")]
    pub uri: String,
    #[serde(default = "default_mongo_database")]
    pub database: String,
    #[serde(default = "default_mongo_collection")]
    pub collection: String,
}

fn default_mongo_uri() -> String {
    "mongodb://localhost:27017".into()
}
fn default_mongo_database() -> String {
    "stowage".into()
}
fn default_mongo_collection() -> String {
    "text_content".into()
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: default_mongo_uri(),
            database: default_mongo_database(),
            collection: default_mongo_collection(),
        }
    }
}
