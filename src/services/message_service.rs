use crate::domain::message::QueuedEnvelope;
use crate::error::Result;
use crate::storage::DbPool;
use crate::storage::message_repo::MessageRepository;
use opentelemetry::{global, metrics::Counter};
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    queued_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("umbra-server");
        Self {
            queued_total: meter
                .u64_counter("umbra_messages_queued_total")
                .with_description("Envelopes stored for offline recipients")
                .build(),
        }
    }
}

/// Offline-queue access for the relay engine.
#[derive(Clone, Debug)]
pub struct MessageService {
    pool: DbPool,
    repo: MessageRepository,
    metrics: Metrics,
}

impl MessageService {
    #[must_use]
    pub fn new(pool: DbPool, repo: MessageRepository) -> Self {
        Self { pool, repo, metrics: Metrics::new() }
    }

    /// Stores one envelope for an offline recipient.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the insert fails.
    #[tracing::instrument(err(level = "warn"), skip(self, payload), fields(recipient_id = %recipient_id))]
    pub async fn queue(&self, recipient_id: Uuid, sender_id: Uuid, payload: &[u8]) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        self.repo.enqueue(&mut conn, recipient_id, sender_id, payload).await?;

        self.metrics.queued_total.add(1, &[]);
        tracing::debug!("Envelope queued for offline delivery");

        Ok(())
    }

    /// Every queued envelope for a recipient, oldest first.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(recipient_id = %recipient_id))]
    pub async fn pending_for(&self, recipient_id: Uuid) -> Result<Vec<QueuedEnvelope>> {
        let mut conn = self.pool.acquire().await?;
        self.repo.fetch_pending(&mut conn, recipient_id).await
    }

    /// Deletes a delivered envelope.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the deletion fails.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        self.repo.delete(&mut conn, id).await
    }
}
