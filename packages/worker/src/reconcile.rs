use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::ContentError;
use common::storage::BlobStore;
use common::store::BlobMetaStore;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub referenced: usize,
    pub removed: usize,
    /// Unreferenced but younger than the grace period.
    pub skipped_recent: usize,
    /// Leftovers of interrupted writes.
    pub staging_removed: usize,
}

/// Deletes bytes that no blob record points at.
pub struct OrphanSweeper {
    meta: Arc<dyn BlobMetaStore>,
    blobs: Arc<dyn BlobStore>,
}

impl OrphanSweeper {
    pub fn new(meta: Arc<dyn BlobMetaStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { meta, blobs }
    }

    /// One pass. Entries newer than `grace` are skipped, since an in-flight
    /// ingestion writes bytes before it upserts the record.
    pub async fn sweep(&self, grace: Duration) -> Result<SweepReport, ContentError> {
        // Listing before loading references means a record committed
        // in between can only make us keep more, never delete a live path.
        let entries = self.blobs.list().await?;
        let referenced = self.meta.referenced_paths().await?;
        let cutoff = chrono::Duration::from_std(grace)
            .ok()
            .and_then(|grace| Utc::now().checked_sub_signed(grace))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut report = SweepReport {
            scanned: entries.len(),
            ..Default::default()
        };

        for entry in entries {
            if referenced.contains(&entry.path) {
                report.referenced += 1;
                continue;
            }
            if entry.modified > cutoff {
                report.skipped_recent += 1;
                continue;
            }
            match self.blobs.delete(&entry.path).await {
                Ok(_) => report.removed += 1,
                Err(e) => warn!(path = %entry.path, error = %e, "Failed to delete orphan"),
            }
        }

        match self.blobs.reap_staging(cutoff).await {
            Ok(n) => report.staging_removed = n,
            Err(e) => warn!(error = %e, "Failed to reap staged writes"),
        }

        Ok(report)
    }

    /// Sweep every `interval` forever.
    pub async fn run(self, interval: Duration, grace: Duration) {
        info!(
            interval_secs = interval.as_secs(),
            grace_secs = grace.as_secs(),
            "Starting orphan sweeper"
        );
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;
            match self.sweep(grace).await {
                Ok(report) if report.removed > 0 || report.staging_removed > 0 => {
                    info!(?report, "Removed orphaned blob bytes");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Orphan sweep failed"),
            }
        }
    }
}
