use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common::retry::{RetryPolicy, spawn_cleanup_task};
use common::storage::FilesystemBlobStore;
use common::store::mongo::MongoTextStore;
use common::store::sea::{SeaOrmBlobMetaStore, connect};
use mq::{Producer, Subscriber, Topic, init_broker};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use worker::{DurableWriter, IngestionConsumer, OrphanSweeper, WorkerAppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let config = WorkerAppConfig::load().context("Failed to load config")?;
    info!(worker_id = %config.worker.id, "Worker starting");

    if config.mq.backend == common::config::MqBackend::Memory {
        warn!("In-process broker selected; this worker will only see messages it publishes itself");
    }

    let db = connect(&config.database.url)
        .await
        .context("Failed to connect to metadata database")?;
    let meta = Arc::new(SeaOrmBlobMetaStore::new(db));

    let text = Arc::new(
        MongoTextStore::connect(&config.mongo)
            .await
            .context("Failed to connect to text store")?,
    );

    let blobs = Arc::new(
        FilesystemBlobStore::new(
            PathBuf::from(&config.storage.blob_dir),
            config.storage.max_payload_size,
        )
        .await
        .context("Failed to initialize blob store")?,
    );

    let broker = init_broker(&config.mq)
        .await
        .context("Failed to initialize MQ")?;

    let call_timeout = config.storage.call_timeout();
    let writer = DurableWriter::new(text, meta.clone(), blobs.clone(), call_timeout);
    let topic = Topic::new(&config.mq.topic, config.mq.partitions);
    let dlq = Producer::new(broker.clone(), Topic::new(&config.mq.dlq_topic, 1), call_timeout);

    let consumer = Arc::new(IngestionConsumer::new(
        Subscriber::new(broker, topic, call_timeout),
        writer,
        dlq,
        RetryPolicy::from(&config.dlq),
        Duration::from_millis(config.mq.poll_interval_ms),
    ));

    let _cleanup_handle = spawn_cleanup_task(
        consumer.retry_tracker(),
        Duration::from_secs(config.dlq.retry_cleanup_interval_secs),
        Duration::from_secs(config.dlq.retry_max_age_secs),
    );

    if config.worker.reconcile_interval_secs > 0 {
        let sweeper = OrphanSweeper::new(meta, blobs);
        tokio::spawn(sweeper.run(
            Duration::from_secs(config.worker.reconcile_interval_secs),
            Duration::from_secs(config.worker.orphan_grace_secs),
        ));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let running = tokio::spawn(consumer.run(shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested, finishing in-flight messages");
    let _ = shutdown_tx.send(true);

    if let Err(e) = running.await {
        error!(error = %e, "Consumer stopped unexpectedly");
    }

    Ok(())
}
