pub mod auth;
pub mod gateway;
pub mod health;
pub mod keys;
pub mod middleware;
pub mod push_tokens;
pub mod rate_limit;
pub mod registration;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::services::auth_service::AuthService;
use crate::services::gateway::GatewayService;
use crate::services::health_service::HealthService;
use crate::services::key_service::KeyService;
use crate::services::push_token_service::PushTokenService;
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

const HTTP_TIMEOUT_SECS: u64 = 30;

/// Application context carried through every handler. Created once at
/// startup, torn down on shutdown; there is no other process-global state.
#[derive(Clone, Debug)]
pub struct AppState {
    pub auth_service: AuthService,
    pub key_service: KeyService,
    pub push_token_service: PushTokenService,
    pub gateway_service: GatewayService,
    pub health_service: HealthService,
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Builds the public router: HTTP surface with per-route rate limits plus
/// the WebSocket gateway.
#[must_use]
pub fn app_router(state: AppState, config: &Config) -> Router {
    let extractor = rate_limit::IpKeyExtractor::new(config.server.trusted_proxies.clone());

    // 10/hour means one refill every 360 seconds.
    let register_conf = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(extractor.clone())
            .period(Duration::from_secs((3600 / u64::from(config.rate_limit.register_per_hour.max(1))).max(1)))
            .burst_size(config.rate_limit.register_per_hour.max(1))
            .finish()
            .expect("invalid registration rate limit"),
    );

    let keys_conf = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(extractor.clone())
            .period(Duration::from_secs((60 / u64::from(config.rate_limit.keys_per_minute.max(1))).max(1)))
            .burst_size(config.rate_limit.keys_per_minute.max(1))
            .finish()
            .expect("invalid key-fetch rate limit"),
    );

    let token_conf = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(extractor)
            .period(Duration::from_secs((60 / u64::from(config.rate_limit.token_per_minute.max(1))).max(1)))
            .burst_size(config.rate_limit.token_per_minute.max(1))
            .finish()
            .expect("invalid token rate limit"),
    );

    let origins: Vec<HeaderValue> =
        config.cors_origin_list().iter().filter_map(|origin| origin.parse().ok()).collect();
    let cors = CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any);

    let http_routes = Router::new()
        .merge(
            Router::new()
                .route("/api/v1/register", post(registration::register))
                .route_layer(GovernorLayer::new(register_conf).error_handler(rate_limit::rate_limit_error_response)),
        )
        .merge(
            Router::new()
                .route("/api/v1/keys/{phone_hash}", get(keys::fetch_bundle))
                .route_layer(GovernorLayer::new(keys_conf).error_handler(rate_limit::rate_limit_error_response)),
        )
        .merge(
            Router::new()
                .route("/api/v1/auth/token", post(auth::issue_token))
                .route_layer(GovernorLayer::new(token_conf).error_handler(rate_limit::rate_limit_error_response)),
        )
        .route("/api/v1/push-token", post(push_tokens::store).delete(push_tokens::remove))
        .route("/health/", get(health::health_check))
        .layer(TimeoutLayer::new(Duration::from_secs(HTTP_TIMEOUT_SECS)));

    http_routes
        .route("/ws", get(gateway::websocket_handler))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(cors)
        .with_state(state)
}

/// Validates the 64-lowercase-hex shape shared by every `phone_hash` input.
pub(crate) fn validate_phone_hash(phone_hash: &str) -> Result<()> {
    let well_formed = phone_hash.len() == 64
        && phone_hash.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));

    if well_formed {
        Ok(())
    } else {
        Err(AppError::BadRequest("phone_hash must be a 64-character lowercase hex string".to_string()))
    }
}

/// Decodes a base64 field, naming it in the rejection.
pub(crate) fn decode_base64(value: &str, field: &str) -> Result<Vec<u8>> {
    STANDARD.decode(value).map_err(|_| AppError::BadRequest(format!("{field} must be valid base64")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_hash_shape() {
        assert!(validate_phone_hash(&"a".repeat(64)).is_ok());
        assert!(validate_phone_hash(&"0".repeat(64)).is_ok());
        assert!(validate_phone_hash(&"a".repeat(63)).is_err());
        assert!(validate_phone_hash(&"a".repeat(65)).is_err());
        assert!(validate_phone_hash(&"A".repeat(64)).is_err());
        assert!(validate_phone_hash(&"g".repeat(64)).is_err());
    }

    #[test]
    fn base64_decode_names_the_field() {
        assert_eq!(decode_base64("SUs=", "identity_key").unwrap(), b"IK");
        let err = decode_base64("not base64!", "identity_key").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg.contains("identity_key")));
    }
}
