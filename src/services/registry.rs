use crate::domain::frame::ServerFrame;
use async_trait::async_trait;
use opentelemetry::{
    global,
    metrics::{Counter, UpDownCounter},
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Write half of a live session. The registry only ever needs to push text
/// frames and issue a best-effort close; keeping this behind a trait keeps
/// the registry testable without sockets.
#[async_trait]
pub trait SessionSink: Send + Sync + fmt::Debug {
    /// Writes one text frame. Returns false on any transport failure.
    async fn send_text(&self, text: String) -> bool;

    /// Best-effort close; errors are swallowed.
    async fn close(&self, code: u16, reason: &str);
}

/// The registry is at its connection cap; the caller must close 1013.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("connection registry at capacity")]
pub struct RegistryFull;

#[derive(Clone, Debug)]
struct LiveSession {
    session_id: u64,
    sink: Arc<dyn SessionSink>,
}

#[derive(Clone, Debug)]
struct Metrics {
    active_sessions: UpDownCounter<i64>,
    displaced_total: Counter<u64>,
    rejected_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("umbra-server");
        Self {
            active_sessions: meter
                .i64_up_down_counter("umbra_ws_active_sessions")
                .with_description("Number of live WebSocket sessions")
                .build(),
            displaced_total: meter
                .u64_counter("umbra_ws_sessions_displaced_total")
                .with_description("Sessions closed because the same user reconnected")
                .build(),
            rejected_total: meter
                .u64_counter("umbra_ws_sessions_rejected_total")
                .with_description("Connections rejected at the capacity cap")
                .build(),
        }
    }
}

/// Process-local map of user id to live session, the single source of truth
/// for the online-vs-queued delivery decision.
///
/// All mutation happens under one mutex. The only suspension points inside
/// the critical section are the close of a displaced session (rare and
/// bounded); a send never writes while holding the lock.
#[derive(Debug)]
pub struct ConnectionRegistry {
    sessions: Mutex<HashMap<Uuid, LiveSession>>,
    capacity: usize,
    next_session_id: AtomicU64,
    metrics: Metrics,
}

/// Short user-id prefix safe for log lines.
#[must_use]
pub(crate) fn redact(user_id: Uuid) -> String {
    let mut s = user_id.to_string();
    s.truncate(8);
    s
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            capacity,
            next_session_id: AtomicU64::new(1),
            metrics: Metrics::new(),
        }
    }

    /// Installs a session for `user_id`, displacing any previous one
    /// (newest wins). Returns a session id the caller must present on
    /// [`Self::disconnect`].
    ///
    /// # Errors
    /// Returns [`RegistryFull`] when the process-wide cap is reached; no
    /// existing session is displaced in that case.
    pub async fn connect(&self, user_id: Uuid, sink: Arc<dyn SessionSink>) -> Result<u64, RegistryFull> {
        let mut sessions = self.sessions.lock().await;

        if sessions.len() >= self.capacity {
            self.metrics.rejected_total.add(1, &[]);
            tracing::warn!(user = %redact(user_id), capacity = self.capacity, "Connection rejected: at capacity");
            return Err(RegistryFull);
        }

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        if let Some(previous) = sessions.insert(user_id, LiveSession { session_id, sink }) {
            // Tolerated suspension under the lock: displacement is rare and
            // the close is best-effort.
            previous.sink.close(1000, "Session replaced by newer connection").await;
            self.metrics.displaced_total.add(1, &[]);
            tracing::info!(user = %redact(user_id), "Displaced previous session");
        } else {
            self.metrics.active_sessions.add(1, &[]);
        }

        tracing::info!(user = %redact(user_id), "User connected");
        Ok(session_id)
    }

    /// Removes the entry for `user_id` if it still belongs to `session_id`.
    /// A displaced session calling in with its stale id is a no-op, so it
    /// can never evict its replacement. Idempotent.
    pub async fn disconnect(&self, user_id: Uuid, session_id: u64) {
        let mut sessions = self.sessions.lock().await;

        if sessions.get(&user_id).is_some_and(|s| s.session_id == session_id) {
            sessions.remove(&user_id);
            self.metrics.active_sessions.add(-1, &[]);
            tracing::info!(user = %redact(user_id), "User disconnected");
        }
    }

    /// Attempts live delivery of one frame. Returns false when the user has
    /// no session or the transport write fails; the caller decides whether
    /// to queue.
    ///
    /// The handle is copied out and the map lock released before the write:
    /// one slow consumer must never serialize fan-out for everyone else.
    pub async fn send(&self, user_id: Uuid, frame: &ServerFrame) -> bool {
        let sink = {
            let sessions = self.sessions.lock().await;
            sessions.get(&user_id).map(|s| Arc::clone(&s.sink))
        };

        match sink {
            Some(sink) => sink.send_text(frame.to_json()).await,
            None => false,
        }
    }

    /// Number of live sessions.
    pub async fn active_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[derive(Debug, Default)]
    struct MockSink {
        sent: Mutex<Vec<String>>,
        closed_with: Mutex<Option<u16>>,
        fail_sends: AtomicBool,
    }

    impl MockSink {
        fn failing() -> Self {
            let sink = Self::default();
            sink.fail_sends.store(true, Ordering::Relaxed);
            sink
        }

        async fn close_code(&self) -> Option<u16> {
            *self.closed_with.lock().await
        }
    }

    #[async_trait]
    impl SessionSink for MockSink {
        async fn send_text(&self, text: String) -> bool {
            if self.fail_sends.load(Ordering::Relaxed) {
                return false;
            }
            self.sent.lock().await.push(text);
            true
        }

        async fn close(&self, code: u16, _reason: &str) {
            *self.closed_with.lock().await = Some(code);
        }
    }

    fn frame(sender_id: Uuid) -> ServerFrame {
        ServerFrame::EncryptedMessage {
            sender_id,
            payload: "Zm9v".to_string(),
            timestamp: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[tokio::test]
    async fn displacement_closes_previous_session() {
        let registry = ConnectionRegistry::new(10);
        let user = Uuid::new_v4();

        let first = Arc::new(MockSink::default());
        let second = Arc::new(MockSink::default());

        registry.connect(user, Arc::clone(&first) as Arc<dyn SessionSink>).await.unwrap();
        registry.connect(user, Arc::clone(&second) as Arc<dyn SessionSink>).await.unwrap();

        assert_eq!(first.close_code().await, Some(1000));
        assert_eq!(second.close_code().await, None);
        assert_eq!(registry.active_count().await, 1);
    }

    #[tokio::test]
    async fn capacity_cap_rejects_without_displacing() {
        let registry = ConnectionRegistry::new(1);
        let resident = Uuid::new_v4();
        let resident_sink = Arc::new(MockSink::default());

        registry.connect(resident, Arc::clone(&resident_sink) as Arc<dyn SessionSink>).await.unwrap();

        let newcomer_sink = Arc::new(MockSink::default());
        let result = registry.connect(Uuid::new_v4(), Arc::clone(&newcomer_sink) as Arc<dyn SessionSink>).await;

        assert_eq!(result, Err(RegistryFull));
        assert_eq!(resident_sink.close_code().await, None);
        assert!(registry.send(resident, &frame(Uuid::new_v4())).await);
    }

    #[tokio::test]
    async fn send_to_absent_user_is_false() {
        let registry = ConnectionRegistry::new(10);
        assert!(!registry.send(Uuid::new_v4(), &frame(Uuid::new_v4())).await);
    }

    #[tokio::test]
    async fn transport_failure_surfaces_as_undelivered() {
        let registry = ConnectionRegistry::new(10);
        let user = Uuid::new_v4();
        registry.connect(user, Arc::new(MockSink::failing()) as Arc<dyn SessionSink>).await.unwrap();

        assert!(!registry.send(user, &frame(Uuid::new_v4())).await);
    }

    #[tokio::test]
    async fn stale_disconnect_does_not_evict_replacement() {
        let registry = ConnectionRegistry::new(10);
        let user = Uuid::new_v4();

        let first_id = registry.connect(user, Arc::new(MockSink::default()) as Arc<dyn SessionSink>).await.unwrap();
        let second = Arc::new(MockSink::default());
        registry.connect(user, Arc::clone(&second) as Arc<dyn SessionSink>).await.unwrap();

        registry.disconnect(user, first_id).await;

        assert_eq!(registry.active_count().await, 1);
        assert!(registry.send(user, &frame(Uuid::new_v4())).await);
        assert_eq!(second.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let registry = ConnectionRegistry::new(10);
        let user = Uuid::new_v4();
        let id = registry.connect(user, Arc::new(MockSink::default()) as Arc<dyn SessionSink>).await.unwrap();

        registry.disconnect(user, id).await;
        registry.disconnect(user, id).await;

        assert_eq!(registry.active_count().await, 0);
    }
}
