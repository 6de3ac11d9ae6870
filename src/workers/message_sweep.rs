use crate::config::RetentionConfig;
use crate::error::AppError;
use crate::storage::DbPool;
use crate::storage::message_repo::MessageRepository;
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
                .u64_counter("umbra_messages_swept_total")
                .with_description("Queued envelopes deleted by the retention sweep")
                .build(),
        }
    }
}

/// Periodically deletes queued envelopes past the retention window. Failures
/// are logged and skipped; the next tick retries.
#[derive(Debug)]
pub struct MessageSweepWorker {
    pool: DbPool,
    repo: MessageRepository,
    config: RetentionConfig,
    metrics: Metrics,
}

impl MessageSweepWorker {
    #[must_use]
    pub fn new(pool: DbPool, repo: MessageRepository, config: RetentionConfig) -> Self {
        Self { pool, repo, config, metrics: Metrics::new() }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.sweep_interval_secs));

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.perform_sweep()
                        .instrument(tracing::info_span!("message_sweep_iteration"))
                        .await
                    {
                        tracing::error!(error = ?e, "Message sweep iteration failed");
                    }
                }
                _ = shutdown.changed() => {}
            }
        }
        tracing::info!("Message sweep loop shutting down...");
    }

    /// Deletes envelopes older than the configured TTL.
    ///
    /// # Errors
    /// Returns an error if the database connection or query fails.
    #[tracing::instrument(skip(self), err)]
    pub async fn perform_sweep(&self) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        let deleted = self.repo.delete_older_than(&mut conn, self.config.message_ttl_days).await?;

        if deleted > 0 {
            self.metrics.swept_total.add(deleted, &[]);
            tracing::info!(count = deleted, "Deleted expired queued envelopes");
        }

        Ok(())
    }
}
