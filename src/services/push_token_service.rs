use crate::domain::user::PushToken;
use crate::error::Result;
use crate::storage::DbPool;
use crate::storage::push_token_repo::PushTokenRepository;
use uuid::Uuid;

/// Keeps the `(user, token, platform)` mapping current. Notification fan-out
/// is a future collaborator; nothing in the relay reads these rows yet.
#[derive(Clone, Debug)]
pub struct PushTokenService {
    pool: DbPool,
    repo: PushTokenRepository,
}

impl PushTokenService {
    #[must_use]
    pub const fn new(pool: DbPool, repo: PushTokenRepository) -> Self {
        Self { pool, repo }
    }

    /// # Errors
    /// Returns `AppError::Database` if the upsert fails.
    #[tracing::instrument(err, skip(self, token), fields(user_id = %user_id))]
    pub async fn store(&self, user_id: Uuid, token: &str, platform: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        self.repo.upsert(&mut conn, user_id, token, platform).await
    }

    /// Removes one token. Idempotent; removing an unknown token is not an
    /// error.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the deletion fails.
    #[tracing::instrument(err, skip(self, token), fields(user_id = %user_id))]
    pub async fn remove(&self, user_id: Uuid, token: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        self.repo.delete(&mut conn, user_id, token).await?;
        Ok(())
    }

    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(err, skip(self), fields(user_id = %user_id))]
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<PushToken>> {
        let mut conn = self.pool.acquire().await?;
        self.repo.list_for_user(&mut conn, user_id).await
    }
}
