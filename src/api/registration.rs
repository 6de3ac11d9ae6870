use crate::api::{AppState, decode_base64, validate_phone_hash};
use crate::domain::keys::{OneTimePrekey, Registration};
use crate::error::Result;
use axum::{Json, extract::State, response::IntoResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub phone_hash: String,
    pub identity_key: String,
    pub signed_prekey: String,
    pub prekey_signature: String,
    #[serde(default)]
    pub one_time_prekeys: Vec<PrekeyDto>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PrekeyDto {
    pub key_id: i32,
    pub public_key: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub status: &'static str,
    pub user_id: Uuid,
}

/// `POST /api/v1/register` — upsert long-lived key material and a one-time
/// prekey batch.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    validate_phone_hash(&payload.phone_hash)?;

    let identity_key = decode_base64(&payload.identity_key, "identity_key")?;
    let signed_prekey = decode_base64(&payload.signed_prekey, "signed_prekey")?;
    let prekey_signature = decode_base64(&payload.prekey_signature, "prekey_signature")?;

    let mut one_time_prekeys = Vec::with_capacity(payload.one_time_prekeys.len());
    for prekey in &payload.one_time_prekeys {
        one_time_prekeys.push(OneTimePrekey {
            key_id: prekey.key_id,
            public_key: decode_base64(&prekey.public_key, "one_time_prekeys[].public_key")?,
        });
    }

    let user_id = state
        .key_service
        .register(Registration {
            phone_hash: payload.phone_hash,
            identity_key,
            signed_prekey,
            prekey_signature,
            one_time_prekeys,
        })
        .await?;

    Ok(Json(RegisterResponse { status: "registered", user_id }))
}
