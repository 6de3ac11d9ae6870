use crate::domain::keys::OneTimePrekey;
use crate::error::Result;
use crate::storage::records::DispensedPrekeyRecord;
use sqlx::PgConnection;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct KeyRepository {}

impl KeyRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Upserts a batch of one-time prekeys. Re-uploading an existing
    /// `(user_id, key_id)` replaces the public bytes and resets `used`, which
    /// lets clients recover from a wiped keystore.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the insert fails.
    #[tracing::instrument(level = "debug", skip(self, conn, keys), fields(count = keys.len()), err)]
    pub(crate) async fn upsert_one_time_prekeys(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
        keys: &[OneTimePrekey],
    ) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut key_ids = Vec::with_capacity(keys.len());
        let mut public_keys = Vec::with_capacity(keys.len());
        for k in keys {
            key_ids.push(k.key_id);
            public_keys.push(k.public_key.clone());
        }

        sqlx::query(
            r#"
            INSERT INTO one_time_prekeys (user_id, key_id, public_key)
            SELECT $1, u.key_id, u.public_key
            FROM UNNEST($2::int4[], $3::bytea[]) AS u(key_id, public_key)
            ON CONFLICT (user_id, key_id) DO UPDATE
            SET public_key = EXCLUDED.public_key, used = FALSE
            "#,
        )
        .bind(user_id)
        .bind(&key_ids)
        .bind(&public_keys)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Marks the oldest unused prekey as consumed and returns it.
    ///
    /// The `UPDATE … RETURNING` over a locked inner `SELECT` is the whole
    /// dispensing protocol: row locking guarantees no two callers ever
    /// receive the same `(user_id, key_id)`, and `SKIP LOCKED` keeps
    /// concurrent callers from queueing on one row.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the statement fails.
    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub(crate) async fn consume_oldest_unused(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> Result<Option<OneTimePrekey>> {
        let rec = sqlx::query_as::<_, DispensedPrekeyRecord>(
            r#"
            UPDATE one_time_prekeys
            SET used = TRUE
            WHERE id = (
                SELECT id FROM one_time_prekeys
                WHERE user_id = $1 AND NOT used
                ORDER BY created_at ASC, id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING key_id, public_key
            "#,
        )
        .bind(user_id)
        .fetch_optional(conn)
        .await?;

        Ok(rec.map(|r| OneTimePrekey { key_id: r.key_id, public_key: r.public_key }))
    }

    /// Deletes consumed prekeys older than the retention window.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the deletion fails.
    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub async fn delete_used_older_than(&self, conn: &mut PgConnection, ttl_days: i64) -> Result<u64> {
        let cutoff = OffsetDateTime::now_utc() - Duration::days(ttl_days);
        let result = sqlx::query("DELETE FROM one_time_prekeys WHERE used AND created_at < $1")
            .bind(cutoff)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }
}
