use crate::domain::message::QueuedEnvelope;
use crate::error::Result;
use crate::storage::records::PendingMessageRecord;
use sqlx::PgConnection;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct MessageRepository {}

impl MessageRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Stores one envelope for an offline recipient.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the insert fails (including an unknown
    /// recipient, which violates the foreign key).
    #[tracing::instrument(level = "debug", skip(self, conn, payload), err)]
    pub(crate) async fn enqueue(
        &self,
        conn: &mut PgConnection,
        recipient_id: Uuid,
        sender_id: Uuid,
        payload: &[u8],
    ) -> Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO pending_messages (recipient_id, sender_id, encrypted_payload)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(recipient_id)
        .bind(sender_id)
        .bind(payload)
        .fetch_one(conn)
        .await?;

        Ok(id)
    }

    /// Fetches every queued envelope for a recipient in delivery order.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub(crate) async fn fetch_pending(
        &self,
        conn: &mut PgConnection,
        recipient_id: Uuid,
    ) -> Result<Vec<QueuedEnvelope>> {
        let rows = sqlx::query_as::<_, PendingMessageRecord>(
            r#"
            SELECT id, sender_id, encrypted_payload, timestamp
            FROM pending_messages
            WHERE recipient_id = $1
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(recipient_id)
        .fetch_all(conn)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Removes one envelope after it was written to the recipient's socket.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the deletion fails.
    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub(crate) async fn delete(&self, conn: &mut PgConnection, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM pending_messages WHERE id = $1").bind(id).execute(conn).await?;
        Ok(())
    }

    /// Deletes envelopes older than the retention window.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the deletion fails.
    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub async fn delete_older_than(&self, conn: &mut PgConnection, ttl_days: i64) -> Result<u64> {
        let cutoff = OffsetDateTime::now_utc() - Duration::days(ttl_days);
        let result =
            sqlx::query(r#"DELETE FROM pending_messages WHERE "timestamp" < $1"#).bind(cutoff).execute(conn).await?;
        Ok(result.rows_affected())
    }
}
