//! # rsvphub-realtime
//!
//! Live notification delivery for RsvpHub. Provides:
//!
//! - The [`PushChannel`] abstraction over one connected client
//! - [`ConnectionHandle`], a buffered channel drained by a socket task
//! - [`ConnectionRegistry`], the per-user map of live channels with
//!   self-healing fan-out
//! - Inbound/outbound message types and the notification builder
//!
//! Identity is verified before a channel reaches the registry.

pub mod connection;
pub mod message;

pub use connection::channel::{ConnectionId, PushChannel, PushError};
pub use connection::handle::ConnectionHandle;
pub use connection::registry::ConnectionRegistry;
pub use message::builder::NotificationBuilder;
pub use message::types::{InboundMessage, OutboundMessage};
