#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod storage;
pub mod telemetry;
pub mod workers;

use crate::config::Config;
use crate::services::auth_service::AuthService;
use crate::services::gateway::GatewayService;
use crate::services::health_service::HealthService;
use crate::services::key_service::KeyService;
use crate::services::message_service::MessageService;
use crate::services::push_token_service::PushTokenService;
use crate::services::registry::ConnectionRegistry;
use crate::storage::DbPool;
use crate::storage::key_repo::KeyRepository;
use crate::storage::message_repo::MessageRepository;
use crate::storage::push_token_repo::PushTokenRepository;
use crate::storage::user_repo::UserRepository;
use crate::workers::{MessageSweepWorker, PrekeySweepWorker};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone, Debug)]
pub struct Services {
    pub auth_service: AuthService,
    pub key_service: KeyService,
    pub message_service: MessageService,
    pub push_token_service: PushTokenService,
    pub gateway_service: GatewayService,
    pub health_service: HealthService,
}

impl Services {
    /// The per-request application context handed to the router.
    #[must_use]
    pub fn app_state(&self, shutdown_rx: watch::Receiver<bool>) -> api::AppState {
        api::AppState {
            auth_service: self.auth_service.clone(),
            key_service: self.key_service.clone(),
            push_token_service: self.push_token_service.clone(),
            gateway_service: self.gateway_service.clone(),
            health_service: self.health_service.clone(),
            shutdown_rx,
        }
    }
}

#[derive(Debug)]
pub struct Workers {
    pub message_sweep: MessageSweepWorker,
    pub prekey_sweep: PrekeySweepWorker,
}

impl Workers {
    #[must_use]
    pub fn spawn_all(self, shutdown_rx: watch::Receiver<bool>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut tasks = Vec::new();

        let message_sweep = self.message_sweep;
        let message_rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            message_sweep.run(message_rx).await;
        }));

        let prekey_sweep = self.prekey_sweep;
        tasks.push(tokio::spawn(async move {
            prekey_sweep.run(shutdown_rx).await;
        }));

        tasks
    }
}

/// The whole object graph: resources, services, and background workers.
#[derive(Debug)]
pub struct App {
    pub pool: DbPool,
    pub services: Services,
    pub workers: Workers,
}

impl App {
    /// Wires repositories, services, and workers. Pure construction; no side
    /// effects.
    #[must_use]
    pub fn assemble(config: &Config, pool: DbPool) -> Self {
        let user_repo = UserRepository::new();
        let key_repo = KeyRepository::new();
        let message_repo = MessageRepository::new();
        let push_token_repo = PushTokenRepository::new();

        let registry = Arc::new(ConnectionRegistry::new(config.gateway.max_connections));

        let auth_service = AuthService::new(pool.clone(), user_repo.clone(), config.auth.clone());
        let key_service = KeyService::new(pool.clone(), user_repo, key_repo.clone());
        let message_service = MessageService::new(pool.clone(), message_repo.clone());
        let push_token_service = PushTokenService::new(pool.clone(), push_token_repo);
        let gateway_service = GatewayService::new(registry, message_service.clone());
        let health_service = HealthService::new(pool.clone(), config.health.clone());

        let services = Services {
            auth_service,
            key_service,
            message_service,
            push_token_service,
            gateway_service,
            health_service,
        };

        let workers = Workers {
            message_sweep: MessageSweepWorker::new(pool.clone(), message_repo, config.retention.clone()),
            prekey_sweep: PrekeySweepWorker::new(pool.clone(), key_repo, config.retention.clone()),
        };

        Self { pool, services, workers }
    }
}

/// Runs database migrations.
///
/// # Errors
/// Returns an error if migrations fail.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    sqlx::migrate!().run(pool).await.map_err(Into::into)
}

/// Sets up a panic hook that logs the panic message and location.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info.payload();
        let msg = payload
            .downcast_ref::<&str>()
            .map_or_else(|| payload.downcast_ref::<String>().map_or_else(|| "Box<Any>", String::as_str), |s| *s);

        let location = panic_info.location().map_or_else(
            || "unknown".to_string(),
            |location| format!("{}:{}:{}", location.file(), location.line(), location.column()),
        );

        tracing::error!(
            panic.message = %msg,
            panic.location = %location,
            "Application panicked"
        );
    }));
}

/// Returns a future that completes when a termination signal is received.
///
/// # Panics
/// Panics if the signal handlers cannot be installed.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}

/// Spawns a task that listens for OS signals and broadcasts a shutdown
/// signal.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });
}
