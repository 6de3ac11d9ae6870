use crate::domain::message::QueuedEnvelope;
use crate::domain::user::AuthMaterial;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, FromRow)]
pub(crate) struct AuthMaterialRecord {
    pub(crate) id: Uuid,
    pub(crate) identity_key: Vec<u8>,
}

impl From<AuthMaterialRecord> for AuthMaterial {
    fn from(rec: AuthMaterialRecord) -> Self {
        Self { user_id: rec.id, identity_key: rec.identity_key }
    }
}

/// The long-lived key material of one user row, read for bundle assembly.
#[derive(Debug, FromRow)]
pub(crate) struct UserKeysRecord {
    pub(crate) id: Uuid,
    pub(crate) identity_key: Vec<u8>,
    pub(crate) signed_prekey: Vec<u8>,
    pub(crate) prekey_signature: Vec<u8>,
}

#[derive(Debug, FromRow)]
pub(crate) struct DispensedPrekeyRecord {
    pub(crate) key_id: i32,
    pub(crate) public_key: Vec<u8>,
}

#[derive(Debug, FromRow)]
pub(crate) struct PendingMessageRecord {
    pub(crate) id: Uuid,
    pub(crate) sender_id: Uuid,
    pub(crate) encrypted_payload: Vec<u8>,
    pub(crate) timestamp: OffsetDateTime,
}

impl From<PendingMessageRecord> for QueuedEnvelope {
    fn from(rec: PendingMessageRecord) -> Self {
        Self { id: rec.id, sender_id: rec.sender_id, payload: rec.encrypted_payload, timestamp: rec.timestamp }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct PushTokenRecord {
    pub(crate) token: String,
    pub(crate) platform: String,
}
