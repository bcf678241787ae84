use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub use common::config::{DatabaseConfig, DlqConfig, MongoConfig, MqAppConfig, StorageConfig};

/// Worker-specific configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    /// Identifies this instance in logs. Default: "worker-1".
    #[serde(default = "default_worker_id")]
    pub id: String,
    /// Seconds between orphan sweeps; 0 disables the sweeper. Default: 600.
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    /// Unreferenced bytes younger than this are left alone. Default: 3600.
    #[serde(default = "default_orphan_grace_secs")]
    pub orphan_grace_secs: u64,
}

fn default_worker_id() -> String {
    "worker-1".into()
}
fn default_reconcile_interval_secs() -> u64 {
    600
}
fn default_orphan_grace_secs() -> u64 {
    3600
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            id: default_worker_id(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            orphan_grace_secs: default_orphan_grace_secs(),
        }
    }
}

/// Worker application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct WorkerAppConfig {
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub mq: MqAppConfig,
    #[serde(default)]
    pub dlq: DlqConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub mongo: MongoConfig,
    pub database: DatabaseConfig,
}

impl WorkerAppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("STOWAGE_CONFIG").unwrap_or_else(|_| "config/config".to_string());

        let s = Config::builder()
            .set_default("worker.id", "worker-1")?
            .set_default("mq.backend", "redis")?
            .set_default("mq.url", "redis://localhost:6379")?
            .set_default("mq.topic", "ingestion")?
            .set_default("mq.dlq_topic", "ingestion_dlq")?
            .add_source(File::with_name(&config_path).required(false))
            // e.g. STOWAGE__DATABASE__URL
            .add_source(Environment::with_prefix("STOWAGE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
