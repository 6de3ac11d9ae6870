use crate::api::{AppState, validate_phone_hash};
use crate::error::{AppError, Result};
use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const NONCE_MIN_LEN: usize = 32;
const NONCE_MAX_LEN: usize = 64;
const SIGNATURE_HEX_LEN: usize = 128;

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub phone_hash: String,
    pub nonce: String,
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_in: u64,
    pub user_id: Uuid,
}

/// `POST /api/v1/auth/token` — issue a short-lived bearer token after
/// proof-of-possession of the caller's identity key.
pub async fn issue_token(
    State(state): State<AppState>,
    Json(payload): Json<TokenRequest>,
) -> Result<Json<TokenResponse>> {
    validate_phone_hash(&payload.phone_hash)?;

    if !(NONCE_MIN_LEN..=NONCE_MAX_LEN).contains(&payload.nonce.len()) {
        return Err(AppError::BadRequest(format!(
            "nonce must be between {NONCE_MIN_LEN} and {NONCE_MAX_LEN} characters"
        )));
    }

    if payload.signature.len() != SIGNATURE_HEX_LEN || !payload.signature.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(AppError::BadRequest(format!("signature must be {SIGNATURE_HEX_LEN} hex characters")));
    }

    let issued = state.auth_service.issue_token(&payload.phone_hash, &payload.nonce, &payload.signature).await?;

    Ok(Json(TokenResponse { token: issued.token, expires_in: issued.expires_in, user_id: issued.user_id }))
}
