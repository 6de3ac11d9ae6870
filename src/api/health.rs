use crate::api::AppState;
use crate::domain::message::rfc3339;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use time::OffsetDateTime;

/// `GET /health/` — load-balancer probe. Degraded dependencies surface as
/// 503 so orchestrators stop routing here.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match state.health_service.check_database().await {
        Ok(()) => "connected".to_string(),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed for database");
            e
        }
    };

    let healthy = database == "connected";
    let status_code = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status_code,
        Json(json!({
            "status": if healthy { "healthy" } else { "degraded" },
            "timestamp": rfc3339(OffsetDateTime::now_utc()),
            "services": {
                "database": database,
            },
        })),
    )
}
