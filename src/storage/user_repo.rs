use crate::domain::keys::Registration;
use crate::domain::user::AuthMaterial;
use crate::error::Result;
use crate::storage::records::{AuthMaterialRecord, UserKeysRecord};
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct UserRepository {}

impl UserRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Inserts a user or refreshes the long-lived key material of an existing
    /// one. Re-registration also bumps `last_seen`.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the upsert fails.
    #[tracing::instrument(level = "debug", skip(self, conn, reg), err)]
    pub(crate) async fn upsert_keys(&self, conn: &mut PgConnection, reg: &Registration) -> Result<Uuid> {
        let user_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO users (phone_hash, identity_key, signed_prekey, prekey_signature)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (phone_hash) DO UPDATE
            SET identity_key = EXCLUDED.identity_key,
                signed_prekey = EXCLUDED.signed_prekey,
                prekey_signature = EXCLUDED.prekey_signature,
                last_seen = NOW()
            RETURNING id
            "#,
        )
        .bind(&reg.phone_hash)
        .bind(&reg.identity_key)
        .bind(&reg.signed_prekey)
        .bind(&reg.prekey_signature)
        .fetch_one(conn)
        .await?;

        Ok(user_id)
    }

    /// Fetches the identifier and identity key for a token request.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub(crate) async fn find_auth_material(
        &self,
        conn: &mut PgConnection,
        phone_hash: &str,
    ) -> Result<Option<AuthMaterial>> {
        let rec = sqlx::query_as::<_, AuthMaterialRecord>("SELECT id, identity_key FROM users WHERE phone_hash = $1")
            .bind(phone_hash)
            .fetch_optional(conn)
            .await?;

        Ok(rec.map(Into::into))
    }

    /// Fetches the long-lived key material for bundle assembly.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub(crate) async fn find_keys(&self, conn: &mut PgConnection, phone_hash: &str) -> Result<Option<UserKeysRecord>> {
        let rec = sqlx::query_as::<_, UserKeysRecord>(
            r#"
            SELECT id, identity_key, signed_prekey, prekey_signature
            FROM users WHERE phone_hash = $1
            "#,
        )
        .bind(phone_hash)
        .fetch_optional(conn)
        .await?;

        Ok(rec)
    }

    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub(crate) async fn touch_last_seen(&self, conn: &mut PgConnection, user_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE users SET last_seen = NOW() WHERE id = $1").bind(user_id).execute(conn).await?;
        Ok(())
    }
}
