//! RsvpHub Server
//!
//! Main entry point that wires all crates together and starts the server.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use rsvphub_api::AppState;
use rsvphub_auth::JwtDecoder;
use rsvphub_broker::broker_from_config;
use rsvphub_cache::CacheManager;
use rsvphub_core::config::AppConfig;
use rsvphub_core::error::AppError;
use rsvphub_core::traits::CacheProvider;
use rsvphub_database::{DatabasePool, EventRepository, UserRepository};
use rsvphub_realtime::ConnectionRegistry;
use rsvphub_worker::{
    ConsumerSupervisor, MessageDispatcher, NotificationConsumer, RsvpCreatedHandler,
};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        error!(error = %e, "Server terminated with an error");
        std::process::exit(1);
    }
}

/// Load configuration for the environment named by `RSVPHUB_ENV`.
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("RSVPHUB_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    info!("Starting RsvpHub v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Database pool ────────────────────────────────────
    let db = DatabasePool::connect(&config.database).await?;

    // ── Step 2: Cache ────────────────────────────────────────────
    info!(provider = %config.cache.provider, "Initializing cache");
    let cache = Arc::new(CacheManager::new(&config.cache).await?);
    if !cache.health_check().await.unwrap_or(false) {
        warn!("Cache is not responding; reads will go to the database until it recovers");
    }

    // ── Step 3: Broker ───────────────────────────────────────────
    let broker = broker_from_config(&config.broker)?;

    // ── Step 4: Stores read by the notification handler ──────────
    let users = Arc::new(UserRepository::new(db.pool().clone()));
    let events = Arc::new(EventRepository::new(db.pool().clone()));

    // ── Step 5: Token verification ───────────────────────────────
    let jwt_decoder = Arc::new(JwtDecoder::new(&config.auth, cache.clone()));

    // ── Step 6: Connection registry ──────────────────────────────
    let registry = Arc::new(ConnectionRegistry::new(&config.realtime));

    // ── Step 7: Notification consumer ────────────────────────────
    let supervisor = if config.worker.enabled {
        let mut dispatcher = MessageDispatcher::new();
        dispatcher.register(Arc::new(RsvpCreatedHandler::new(
            events,
            users,
            Arc::clone(&registry),
        )));
        let consumer =
            NotificationConsumer::new(broker, &config.broker, &config.worker, dispatcher);
        Some(Arc::new(ConsumerSupervisor::start(consumer)))
    } else {
        info!("Notification consumer disabled");
        None
    };

    // ── Step 8: HTTP server ──────────────────────────────────────
    let state = AppState {
        config: Arc::new(config.clone()),
        jwt_decoder,
        registry: Arc::clone(&registry),
        supervisor: supervisor.clone(),
    };
    let app = rsvphub_api::build_app(state, &config.server.cors);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;
    info!(%addr, "RsvpHub server listening");

    let (drain_tx, mut drain_rx) = watch::channel(false);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = drain_rx.wait_for(|drain| *drain).await;
        })
        .into_future();
    tokio::pin!(server);

    // ── Step 9: Wait for a stop condition ───────────────────────
    let mut server_done = false;
    let consumer_failure = tokio::select! {
        result = &mut server => {
            server_done = true;
            if let Err(e) = result {
                error!(error = %e, "HTTP server stopped");
            }
            None
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, starting graceful shutdown");
            None
        }
        reason = consumer_failed(supervisor.as_deref()) => {
            error!(%reason, "Notification consumer failed, shutting down");
            Some(reason)
        }
    };

    // ── Step 10: Graceful shutdown ──────────────────────────────
    let closed = registry.close_all().await;
    info!(closed, "Closed notification channels");

    if !server_done {
        drain_tx.send_replace(true);
        let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
        match tokio::time::timeout(grace, &mut server).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "HTTP server error during shutdown"),
            Err(_) => warn!(?grace, "HTTP connections still open after grace period"),
        }
    }

    let consumer_result = match &supervisor {
        Some(supervisor) => {
            let timeout = Duration::from_secs(config.worker.shutdown_timeout_seconds);
            supervisor.shutdown(timeout).await
        }
        None => Ok(()),
    };

    db.close().await;

    if let Some(reason) = consumer_failure {
        return Err(AppError::fatal_startup(reason));
    }
    consumer_result?;

    info!("RsvpHub server shut down gracefully");
    Ok(())
}

/// Resolves with the failure reason if the consumer gives up; never
/// resolves when the worker is disabled.
async fn consumer_failed(supervisor: Option<&ConsumerSupervisor>) -> String {
    match supervisor {
        Some(supervisor) => supervisor.failed().await,
        None => std::future::pending().await,
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
