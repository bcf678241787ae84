use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub use common::config::{
    DatabaseConfig, DlqConfig, MongoConfig, MqAppConfig, MqBackend, StorageConfig,
};
pub use worker::WorkerConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: Vec::new(),
            max_age: 3600,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Signs new tokens and verifies incoming ones.
    pub jwt_secret: String,
    /// Retired secrets; tokens they signed keep verifying until they expire.
    #[serde(default)]
    pub previous_secrets: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IngestConfig {
    /// Run the ingestion consumer inside the server process.
    #[serde(default)]
    pub embedded_consumer: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub mongo: MongoConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub mq: MqAppConfig,
    #[serde(default)]
    pub dlq: DlqConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("STOWAGE_CONFIG").unwrap_or_else(|_| "config/config".to_string());

        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("mq.backend", "redis")?
            .set_default("ingest.embedded_consumer", false)?
            .add_source(File::with_name(&config_path).required(false))
            // Override from environment (e.g., STOWAGE__AUTH__JWT_SECRET)
            .add_source(Environment::with_prefix("STOWAGE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
