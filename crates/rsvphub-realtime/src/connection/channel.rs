//! The push-channel abstraction over a single connected client.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::message::types::OutboundMessage;

/// Unique connection identifier.
pub type ConnectionId = Uuid;

/// Why a channel refused a message. Either way the channel is dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PushError {
    /// The client side has gone away.
    #[error("channel closed")]
    Closed,
    /// The client stopped draining its buffer.
    #[error("channel buffer full")]
    Backpressure,
}

/// One live, already-authenticated client channel.
#[async_trait]
pub trait PushChannel: Send + Sync + std::fmt::Debug + 'static {
    /// Stable identifier of this channel.
    fn id(&self) -> ConnectionId;

    /// Hand a message to the client.
    async fn send(&self, message: &OutboundMessage) -> Result<(), PushError>;

    /// Close the channel. Idempotent.
    async fn close(&self);

    /// Whether the channel still accepts messages.
    fn is_alive(&self) -> bool;
}
