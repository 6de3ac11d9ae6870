use crate::api::AppState;
use crate::services::gateway::CLOSE_POLICY_VIOLATION;
use axum::{
    extract::{
        Query, State,
        ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    token: Option<String>,
}

/// `GET /ws?token=…` — the relay gateway. The token is verified before the
/// session exists; a missing, invalid, or expired one yields close 1008
/// after the upgrade (the handshake itself must succeed for the client to
/// observe the code).
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    let verified = params.token.as_deref().and_then(|token| state.auth_service.verify_token(token).ok());

    match verified {
        Some(user_id) => {
            let gateway = state.gateway_service.clone();
            let shutdown_rx = state.shutdown_rx.clone();
            ws.on_upgrade(move |socket| async move {
                gateway.handle_socket(socket, user_id, shutdown_rx).await;
            })
        }
        None => ws.on_upgrade(reject_unauthorized),
    }
}

async fn reject_unauthorized(mut socket: WebSocket) {
    let frame = CloseFrame { code: CLOSE_POLICY_VIOLATION, reason: "Invalid or expired token".into() };
    let _ = socket.send(WsMessage::Close(Some(frame))).await;
}
