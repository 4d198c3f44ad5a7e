//! Message broker traits for durable topic-based publish/consume.
//!
//! The model is a topic exchange with durable queues bound to it by a
//! routing pattern. Delivery is at-least-once: a delivery that is never
//! acknowledged is handed out again after the consumer reconnects.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::result::AppResult;

/// A durable queue bound to an exchange by a routing pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    /// Exchange the queue is bound to.
    pub exchange: String,
    /// Durable queue name.
    pub queue: String,
    /// Routing pattern (`*` = one word, `#` = zero or more words).
    pub pattern: String,
}

impl QueueBinding {
    /// Create a new binding description.
    pub fn new(
        exchange: impl Into<String>,
        queue: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
            pattern: pattern.into(),
        }
    }
}

/// A message handed to a consumer and awaiting acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Broker-assigned identifier used for acknowledgment.
    pub delivery_id: String,
    /// Routing key the message was published with.
    pub routing_key: String,
    /// Raw message body (JSON).
    pub payload: Vec<u8>,
    /// Whether this message was handed out before without being acknowledged.
    pub redelivered: bool,
}

/// Factory for broker connections.
#[async_trait]
pub trait MessageBroker: Send + Sync + std::fmt::Debug + 'static {
    /// Open a new connection (the handshake).
    async fn connect(&self) -> AppResult<Arc<dyn BrokerConnection>>;
}

/// An open connection to the broker.
#[async_trait]
pub trait BrokerConnection: Send + Sync + std::fmt::Debug + 'static {
    /// Whether the connection is still usable.
    fn is_open(&self) -> bool;

    /// Declare a durable topic exchange. Idempotent.
    async fn declare_exchange(&self, exchange: &str) -> AppResult<()>;

    /// Publish a persistent message to an exchange.
    async fn publish(&self, exchange: &str, routing_key: &str, payload: &[u8]) -> AppResult<()>;

    /// Declare a durable queue and bind it to its exchange. Idempotent.
    async fn declare_queue(&self, binding: &QueueBinding) -> AppResult<()>;

    /// Fetch up to `max` deliveries for `consumer`, waiting at most `block`.
    ///
    /// Unacknowledged deliveries of this consumer are returned first.
    async fn fetch(
        &self,
        binding: &QueueBinding,
        consumer: &str,
        max: usize,
        block: Duration,
    ) -> AppResult<Vec<Delivery>>;

    /// Acknowledge a delivery so it is never handed out again.
    async fn ack(&self, binding: &QueueBinding, delivery: &Delivery) -> AppResult<()>;

    /// Close the connection.
    async fn close(&self);
}
