use crate::config::RetentionConfig;
use crate::error::AppError;
use crate::storage::DbPool;
use crate::storage::key_repo::KeyRepository;
use opentelemetry::{global, metrics::Counter};
use std::time::Duration;
use tracing::Instrument;

#[derive(Clone, Debug)]
struct Metrics {
    swept_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("umbra-server");
        Self {
            swept_total: meter
                .u64_counter("umbra_prekeys_swept_total")
                .with_description("Consumed prekey rows deleted by the retention sweep")
                .build(),
        }
    }
}

/// Periodically deletes consumed one-time prekeys past the retention window.
/// Unused keys are never touched.
#[derive(Debug)]
pub struct PrekeySweepWorker {
    pool: DbPool,
    repo: KeyRepository,
    config: RetentionConfig,
    metrics: Metrics,
}

impl PrekeySweepWorker {
    #[must_use]
    pub fn new(pool: DbPool, repo: KeyRepository, config: RetentionConfig) -> Self {
        Self { pool, repo, config, metrics: Metrics::new() }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.sweep_interval_secs));

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.perform_sweep()
                        .instrument(tracing::info_span!("prekey_sweep_iteration"))
                        .await
                    {
                        tracing::error!(error = ?e, "Prekey sweep iteration failed");
                    }
                }
                _ = shutdown.changed() => {}
            }
        }
        tracing::info!("Prekey sweep loop shutting down...");
    }

    /// Deletes consumed prekeys older than the configured TTL.
    ///
    /// # Errors
    /// Returns an error if the database connection or query fails.
    #[tracing::instrument(skip(self), err)]
    pub async fn perform_sweep(&self) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        let deleted = self.repo.delete_used_older_than(&mut conn, self.config.prekey_ttl_days).await?;

        if deleted > 0 {
            self.metrics.swept_total.add(deleted, &[]);
            tracing::info!(count = deleted, "Deleted spent prekeys");
        }

        Ok(())
    }
}
