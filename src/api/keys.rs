use crate::api::registration::PrekeyDto;
use crate::api::{AppState, validate_phone_hash};
use crate::domain::keys::KeyBundle;
use crate::error::Result;
use axum::{
    Json,
    extract::{Path, State},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct KeyBundleResponse {
    pub identity_key: String,
    pub signed_prekey: String,
    pub prekey_signature: String,
    pub one_time_prekey: Option<PrekeyDto>,
}

impl From<KeyBundle> for KeyBundleResponse {
    fn from(bundle: KeyBundle) -> Self {
        Self {
            identity_key: STANDARD.encode(&bundle.identity_key),
            signed_prekey: STANDARD.encode(&bundle.signed_prekey),
            prekey_signature: STANDARD.encode(&bundle.prekey_signature),
            one_time_prekey: bundle
                .one_time_prekey
                .map(|k| PrekeyDto { key_id: k.key_id, public_key: STANDARD.encode(&k.public_key) }),
        }
    }
}

/// `GET /api/v1/keys/{phone_hash}` — dispense a bundle, consuming at most
/// one one-time prekey.
pub async fn fetch_bundle(
    State(state): State<AppState>,
    Path(phone_hash): Path<String>,
) -> Result<Json<KeyBundleResponse>> {
    validate_phone_hash(&phone_hash)?;

    let bundle = state.key_service.fetch_bundle(&phone_hash).await?;

    Ok(Json(bundle.into()))
}
