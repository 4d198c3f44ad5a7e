//! Route definitions for the RsvpHub HTTP surface.

use axum::Router;
use axum::routing::get;

use crate::handlers;
use crate::state::AppState;

/// Build the router and thread `AppState` through every route.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/ws/notifications/{user_id}",
            get(handlers::ws::ws_notifications),
        )
        .with_state(state)
}
