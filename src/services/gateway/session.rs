use crate::domain::frame::{ClientFrame, MalformedFrame, ServerFrame};
use crate::domain::message::rfc3339;
use crate::error::Result;
use crate::services::gateway::{CLOSE_GOING_AWAY, GatewayMetrics, WsSink};
use crate::services::message_service::MessageService;
use crate::services::registry::{ConnectionRegistry, SessionSink, redact};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use opentelemetry::KeyValue;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::watch;
use uuid::Uuid;

/// One authenticated connection. Lifecycle: the queued backlog is drained in
/// timestamp order, then inbound frames are dispatched until the peer goes
/// away, the transport errors, or the server shuts down.
pub(crate) struct Session {
    pub(crate) user_id: Uuid,
    pub(crate) session_id: u64,
    pub(crate) stream: SplitStream<WebSocket>,
    pub(crate) sink: Arc<WsSink>,
    pub(crate) registry: Arc<ConnectionRegistry>,
    pub(crate) messages: MessageService,
    pub(crate) metrics: GatewayMetrics,
    pub(crate) shutdown_rx: watch::Receiver<bool>,
}

impl Session {
    #[tracing::instrument(
        name = "ws_session",
        skip(self),
        fields(user = %redact(self.user_id), session_id = self.session_id)
    )]
    pub(crate) async fn run(self) {
        // Destructured so the select! arms below can hold disjoint mutable
        // borrows while handlers use the shared pieces.
        let Self { user_id, session_id: _, mut stream, sink, registry, messages, metrics, mut shutdown_rx } = self;

        if !drain(user_id, &sink, &messages, &metrics).await {
            return;
        }

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        sink.close(CLOSE_GOING_AWAY, "Server shutting down").await;
                        break;
                    }
                }

                msg = stream.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            match ClientFrame::parse(text.as_str()) {
                                Ok(Some(frame)) => {
                                    if dispatch(user_id, &registry, &messages, &metrics, frame).await.is_err() {
                                        break;
                                    }
                                }
                                Ok(None) => {
                                    metrics.frames_dropped_total.add(1, &[]);
                                }
                                Err(MalformedFrame) => {
                                    tracing::debug!("Malformed frame, closing session");
                                    break;
                                }
                            }
                        }
                        // Protocol pings are answered by axum; binary frames
                        // have no meaning on this endpoint.
                        Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Binary(_))) => {}
                        Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    }
                }
            }
        }
    }
}

/// Delivers the queued backlog, deleting each row only after its frame
/// reached the transport. Returns false when the session must close;
/// undelivered rows stay queued for the next reconnect.
async fn drain(user_id: Uuid, ws_sink: &WsSink, messages: &MessageService, metrics: &GatewayMetrics) -> bool {
    let pending = match messages.pending_for(user_id).await {
        Ok(pending) => pending,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read queued envelopes, closing session");
            return false;
        }
    };

    if pending.is_empty() {
        return true;
    }

    let count = pending.len() as u64;

    // The write half stays locked for the whole phase: concurrent live sends
    // to this user park on the sink mutex until the backlog is out.
    let mut sink = ws_sink.guard().await;

    for envelope in pending {
        let frame = ServerFrame::EncryptedMessage {
            sender_id: envelope.sender_id,
            payload: STANDARD.encode(&envelope.payload),
            timestamp: rfc3339(envelope.timestamp),
        };

        if sink.send(WsMessage::Text(frame.to_json().into())).await.is_err() {
            tracing::debug!("Transport write failed mid-drain, closing session");
            return false;
        }

        if let Err(e) = messages.delete(envelope.id).await {
            // The envelope was already delivered; leaving the row behind
            // means a duplicate on the next reconnect, which clients
            // suppress. Closing forces a clean retry.
            tracing::warn!(error = %e, "Failed to delete drained envelope, closing session");
            return false;
        }
    }

    drop(sink);

    metrics.drain_batch_size.record(count, &[]);
    tracing::debug!(count, "Drained queued envelopes");
    true
}

/// Routes one inbound frame. An `Err` closes the session.
async fn dispatch(
    user_id: Uuid,
    registry: &ConnectionRegistry,
    messages: &MessageService,
    metrics: &GatewayMetrics,
    frame: ClientFrame,
) -> Result<()> {
    match frame {
        ClientFrame::EncryptedMessage { recipient_id, payload } => {
            let Ok(raw) = STANDARD.decode(&payload) else {
                tracing::debug!("Dropping encrypted_message with undecodable payload");
                metrics.frames_dropped_total.add(1, &[]);
                return Ok(());
            };

            let outbound = ServerFrame::EncryptedMessage {
                sender_id: user_id,
                payload,
                timestamp: rfc3339(OffsetDateTime::now_utc()),
            };

            if registry.send(recipient_id, &outbound).await {
                metrics.relayed_total.add(1, &[KeyValue::new("mode", "live")]);
            } else {
                // Absent recipient and failed transport write look the same
                // here; both land in the offline queue.
                messages.queue(recipient_id, user_id, &raw).await?;
                metrics.relayed_total.add(1, &[KeyValue::new("mode", "queued")]);
            }
        }
        signaling => {
            let recipient_id = signaling.recipient_id();
            let kind = signaling.kind();

            if let Some(forward) = signaling.into_forward(user_id) {
                if registry.send(recipient_id, &forward).await {
                    metrics.signaling_forwarded_total.add(1, &[KeyValue::new("kind", kind)]);
                } else {
                    // Signaling has no meaning after the moment; never
                    // queued, never an error to the caller.
                    tracing::debug!(kind, "Signaling recipient offline, frame dropped");
                }
            }
        }
    }

    Ok(())
}
