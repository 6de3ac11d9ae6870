use crate::api::AppState;
use crate::api::middleware::AuthUser;
use crate::error::{AppError, Result};
use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};

const MAX_TOKEN_LEN: usize = 512;
const MAX_PLATFORM_LEN: usize = 10;

#[derive(Debug, Deserialize)]
pub struct StorePushTokenRequest {
    pub token: String,
    #[serde(default = "default_platform")]
    pub platform: String,
}

fn default_platform() -> String {
    "android".to_string()
}

#[derive(Debug, Deserialize)]
pub struct RemovePushTokenRequest {
    pub token: String,
}

/// `POST /api/v1/push-token` — store a notification routing token.
pub async fn store(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<StorePushTokenRequest>,
) -> Result<Json<Value>> {
    if payload.token.is_empty() || payload.token.len() > MAX_TOKEN_LEN {
        return Err(AppError::BadRequest(format!("token must be 1-{MAX_TOKEN_LEN} characters")));
    }
    if payload.platform.is_empty() || payload.platform.len() > MAX_PLATFORM_LEN {
        return Err(AppError::BadRequest(format!("platform must be 1-{MAX_PLATFORM_LEN} characters")));
    }

    state.push_token_service.store(auth_user.user_id, &payload.token, &payload.platform).await?;

    Ok(Json(json!({ "status": "stored" })))
}

/// `DELETE /api/v1/push-token` — drop a token. Idempotent.
pub async fn remove(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<RemovePushTokenRequest>,
) -> Result<Json<Value>> {
    state.push_token_service.remove(auth_user.user_id, &payload.token).await?;

    Ok(Json(json!({ "status": "deleted" })))
}
