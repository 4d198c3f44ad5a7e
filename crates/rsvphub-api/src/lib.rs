//! # rsvphub-api
//!
//! HTTP layer for RsvpHub built on Axum.
//!
//! Accepts WebSocket notification channels for authenticated users, reports
//! health, and maps [`AppError`](rsvphub_core::error::AppError) kinds to HTTP
//! statuses for any handler mounted on the router.

pub mod app;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::build_app;
pub use error::ApiError;
pub use state::AppState;
