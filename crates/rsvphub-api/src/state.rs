//! Application state shared across all handlers.

use std::sync::Arc;

use rsvphub_auth::JwtDecoder;
use rsvphub_core::config::AppConfig;
use rsvphub_realtime::ConnectionRegistry;
use rsvphub_worker::ConsumerSupervisor;

/// Shared application state, cloned into every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<AppConfig>,
    /// Access-token verification for channel upgrades.
    pub jwt_decoder: Arc<JwtDecoder>,
    /// Live notification channels.
    pub registry: Arc<ConnectionRegistry>,
    /// Notification consumer, absent when the worker is disabled.
    pub supervisor: Option<Arc<ConsumerSupervisor>>,
}
