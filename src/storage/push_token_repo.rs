use crate::domain::user::PushToken;
use crate::error::Result;
use crate::storage::records::PushTokenRecord;
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct PushTokenRepository {}

impl PushTokenRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// # Errors
    /// Returns `AppError::Database` if the upsert fails.
    #[tracing::instrument(level = "debug", skip(self, conn, token), err)]
    pub(crate) async fn upsert(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
        token: &str,
        platform: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO push_tokens (user_id, token, platform)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, token) DO UPDATE SET platform = EXCLUDED.platform
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(platform)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// # Errors
    /// Returns `AppError::Database` if the deletion fails.
    #[tracing::instrument(level = "debug", skip(self, conn, token), err)]
    pub(crate) async fn delete(&self, conn: &mut PgConnection, user_id: Uuid, token: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM push_tokens WHERE user_id = $1 AND token = $2")
            .bind(user_id)
            .bind(token)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub(crate) async fn list_for_user(&self, conn: &mut PgConnection, user_id: Uuid) -> Result<Vec<PushToken>> {
        let rows =
            sqlx::query_as::<_, PushTokenRecord>("SELECT token, platform FROM push_tokens WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(conn)
                .await?;

        Ok(rows.into_iter().map(|r| PushToken { token: r.token, platform: r.platform }).collect())
    }
}
