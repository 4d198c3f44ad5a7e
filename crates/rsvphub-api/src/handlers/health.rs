//! Health check handler.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use rsvphub_worker::ConsumerHealth;

use crate::state::AppState;

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy`, or `degraded` while the consumer is not reading.
    pub status: &'static str,
    /// Server version.
    pub version: &'static str,
    /// Consumer state and counters; absent when the worker is disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer: Option<ConsumerHealth>,
    /// Open notification channels.
    pub connections: usize,
    /// Users with at least one open channel.
    pub online_users: usize,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let consumer = match &state.supervisor {
        Some(supervisor) => Some(supervisor.health().await),
        None => None,
    };
    let healthy = consumer.as_ref().is_none_or(ConsumerHealth::is_healthy);

    Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        consumer,
        connections: state.registry.connection_count().await,
        online_users: state.registry.user_count().await,
    })
}
