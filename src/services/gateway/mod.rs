pub mod session;

use crate::services::message_service::MessageService;
use crate::services::registry::{ConnectionRegistry, RegistryFull, SessionSink, redact};
use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket};
use futures::SinkExt;
use futures::stream::SplitSink;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, watch};
use uuid::Uuid;

pub(crate) const CLOSE_POLICY_VIOLATION: u16 = 1008;
pub(crate) const CLOSE_TRY_AGAIN_LATER: u16 = 1013;
pub(crate) const CLOSE_GOING_AWAY: u16 = 1001;

/// Write half of an accepted WebSocket. Writes serialize through the inner
/// mutex; the drain phase holds the guard across the whole queue flush so no
/// live frame can slip in ahead of older queued traffic.
pub struct WsSink {
    inner: Mutex<SplitSink<WebSocket, WsMessage>>,
}

impl WsSink {
    #[must_use]
    pub(crate) fn new(sink: SplitSink<WebSocket, WsMessage>) -> Self {
        Self { inner: Mutex::new(sink) }
    }

    pub(crate) async fn guard(&self) -> MutexGuard<'_, SplitSink<WebSocket, WsMessage>> {
        self.inner.lock().await
    }
}

impl fmt::Debug for WsSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsSink").finish_non_exhaustive()
    }
}

#[async_trait]
impl SessionSink for WsSink {
    async fn send_text(&self, text: String) -> bool {
        self.inner.lock().await.send(WsMessage::Text(text.into())).await.is_ok()
    }

    async fn close(&self, code: u16, reason: &str) {
        let frame = CloseFrame { code, reason: reason.to_owned().into() };
        let _ = self.inner.lock().await.send(WsMessage::Close(Some(frame))).await;
    }
}

#[derive(Clone, Debug)]
pub(crate) struct GatewayMetrics {
    pub(crate) relayed_total: Counter<u64>,
    pub(crate) signaling_forwarded_total: Counter<u64>,
    pub(crate) frames_dropped_total: Counter<u64>,
    pub(crate) drain_batch_size: Histogram<u64>,
}

impl GatewayMetrics {
    fn new() -> Self {
        let meter = global::meter("umbra-server");
        Self {
            relayed_total: meter
                .u64_counter("umbra_messages_relayed_total")
                .with_description("Ciphertext envelopes accepted for delivery, by mode")
                .build(),
            signaling_forwarded_total: meter
                .u64_counter("umbra_signaling_forwarded_total")
                .with_description("Call-signaling frames forwarded live")
                .build(),
            frames_dropped_total: meter
                .u64_counter("umbra_frames_dropped_total")
                .with_description("Inbound frames dropped without dispatch")
                .build(),
            drain_batch_size: meter
                .u64_histogram("umbra_drain_batch_size")
                .with_description("Queued envelopes delivered per reconnect drain")
                .build(),
        }
    }
}

/// Owns the per-connection lifecycle: registry install (with capacity and
/// displacement semantics), the reconnect drain, and the relay loop.
#[derive(Clone, Debug)]
pub struct GatewayService {
    registry: Arc<ConnectionRegistry>,
    message_service: MessageService,
    metrics: GatewayMetrics,
}

impl GatewayService {
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, message_service: MessageService) -> Self {
        Self { registry, message_service, metrics: GatewayMetrics::new() }
    }

    #[must_use]
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Runs one authenticated connection to completion.
    pub async fn handle_socket(&self, socket: WebSocket, user_id: Uuid, shutdown_rx: watch::Receiver<bool>) {
        use futures::StreamExt;

        let (ws_sink, stream) = socket.split();
        let sink = Arc::new(WsSink::new(ws_sink));

        let session_id = match self.registry.connect(user_id, Arc::clone(&sink) as Arc<dyn SessionSink>).await {
            Ok(id) => id,
            Err(RegistryFull) => {
                sink.close(CLOSE_TRY_AGAIN_LATER, "Server at capacity").await;
                return;
            }
        };

        let session = session::Session {
            user_id,
            session_id,
            stream,
            sink: Arc::clone(&sink),
            registry: self.registry(),
            messages: self.message_service.clone(),
            metrics: self.metrics.clone(),
            shutdown_rx,
        };

        session.run().await;

        self.registry.disconnect(user_id, session_id).await;
        tracing::debug!(user = %redact(user_id), "Session finished");
    }
}
