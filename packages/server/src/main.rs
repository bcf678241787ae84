use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common::retry::{RetryPolicy, spawn_cleanup_task};
use common::storage::FilesystemBlobStore;
use common::store::mongo::MongoTextStore;
use common::store::sea::SeaOrmBlobMetaStore;
use mq::{Producer, Subscriber, Topic, init_broker};
use server::config::{AppConfig, MqBackend};
use server::consumers::DlqSink;
use server::state::{AppState, Backends};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use worker::{DurableWriter, IngestionConsumer, OrphanSweeper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::load().context("Failed to load config")?;

    let db = server::database::init_db(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    let text = MongoTextStore::connect(&config.mongo)
        .await
        .context("Failed to connect to text store")?;

    let blobs = FilesystemBlobStore::new(
        PathBuf::from(&config.storage.blob_dir),
        config.storage.max_payload_size,
    )
    .await
    .context("Failed to initialize blob store")?;

    let broker = init_broker(&config.mq)
        .await
        .context("Failed to initialize MQ")?;

    let backends = Backends {
        text: Arc::new(text),
        meta: Arc::new(SeaOrmBlobMetaStore::new(db.clone())),
        blobs: Arc::new(blobs),
        broker: broker.clone(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poll_interval = Duration::from_millis(config.mq.poll_interval_ms);

    let dlq_sink = DlqSink::new(
        db.clone(),
        Subscriber::new(
            broker.clone(),
            Topic::new(&config.mq.dlq_topic, 1),
            config.storage.call_timeout(),
        ),
    );
    let dlq_handle = tokio::spawn(dlq_sink.run(poll_interval, shutdown_rx.clone()));

    let consumer_handle = if config.ingest.embedded_consumer {
        Some(spawn_embedded_consumer(&config, &backends, shutdown_rx.clone()))
    } else {
        if config.mq.backend == MqBackend::Memory {
            warn!("In-process broker without embedded consumer; uploads will never be persisted");
        }
        None
    };

    let state = AppState::new(config.clone(), db, &backends);
    let app = server::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server running at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await
        .context("Server error")?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = consumer_handle {
        let _ = handle.await;
    }
    let _ = dlq_handle.await;

    Ok(())
}

/// Host the ingestion consumer and the orphan sweeper in this process.
fn spawn_embedded_consumer(
    config: &AppConfig,
    backends: &Backends,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    let call_timeout = config.storage.call_timeout();
    let writer = DurableWriter::new(
        backends.text.clone(),
        backends.meta.clone(),
        backends.blobs.clone(),
        call_timeout,
    );
    let dlq = Producer::new(
        backends.broker.clone(),
        Topic::new(&config.mq.dlq_topic, 1),
        call_timeout,
    );

    let consumer = Arc::new(IngestionConsumer::new(
        Subscriber::new(
            backends.broker.clone(),
            Topic::new(&config.mq.topic, config.mq.partitions),
            call_timeout,
        ),
        writer,
        dlq,
        RetryPolicy::from(&config.dlq),
        Duration::from_millis(config.mq.poll_interval_ms),
    ));

    spawn_cleanup_task(
        consumer.retry_tracker(),
        Duration::from_secs(config.dlq.retry_cleanup_interval_secs),
        Duration::from_secs(config.dlq.retry_max_age_secs),
    );

    if config.worker.reconcile_interval_secs > 0 {
        let sweeper = OrphanSweeper::new(backends.meta.clone(), backends.blobs.clone());
        tokio::spawn(sweeper.run(
            Duration::from_secs(config.worker.reconcile_interval_secs),
            Duration::from_secs(config.worker.orphan_grace_secs),
        ));
    }

    info!(worker_id = %config.worker.id, "Embedded ingestion consumer enabled");
    tokio::spawn(consumer.run(shutdown))
}
