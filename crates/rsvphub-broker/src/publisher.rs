//! Lazily connected, self-healing publisher for domain events.
//!
//! The broker connection is opened on first publish and reused. A cached
//! connection that reports closed is replaced before publishing, and one
//! that breaks during a publish is dropped and replaced once.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use rsvphub_core::error::AppError;
use rsvphub_core::events::{DomainEvent, is_valid_routing_key};
use rsvphub_core::result::AppResult;
use rsvphub_core::traits::broker::{BrokerConnection, MessageBroker};

/// Publishes payloads onto one durable topic exchange.
#[derive(Debug)]
pub struct EventPublisher {
    broker: Arc<dyn MessageBroker>,
    exchange: String,
    connection: Mutex<Option<Arc<dyn BrokerConnection>>>,
}

impl EventPublisher {
    /// Create a publisher for `exchange`. Nothing is opened until the first publish.
    pub fn new(broker: Arc<dyn MessageBroker>, exchange: impl Into<String>) -> Self {
        Self {
            broker,
            exchange: exchange.into(),
            connection: Mutex::new(None),
        }
    }

    /// The exchange this publisher writes to.
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Publish a domain event under its own routing key.
    pub async fn publish_event(&self, event: &DomainEvent) -> AppResult<()> {
        let payload = event.to_payload()?;
        self.publish(event.routing_key(), &payload).await
    }

    /// Publish a raw JSON payload under `topic`.
    pub async fn publish(&self, topic: &str, payload: &[u8]) -> AppResult<()> {
        if !is_valid_routing_key(topic) {
            return Err(AppError::validation(format!("Invalid routing key '{topic}'")));
        }

        let conn = self.connection().await?;
        match conn.publish(&self.exchange, topic, payload).await {
            Ok(()) => {
                debug!(exchange = %self.exchange, routing_key = topic, "Published message");
                Ok(())
            }
            Err(e) if !conn.is_open() => {
                warn!(
                    exchange = %self.exchange,
                    routing_key = topic,
                    error = %e,
                    "Broker connection lost during publish, reconnecting"
                );
                self.discard(&conn).await;
                let conn = self.connection().await?;
                conn.publish(&self.exchange, topic, payload).await
            }
            Err(e) => Err(e),
        }
    }

    /// Close the cached connection, if any.
    pub async fn close(&self) {
        if let Some(conn) = self.connection.lock().await.take() {
            conn.close().await;
        }
    }

    /// The cached connection, reconnecting when it is missing or closed.
    async fn connection(&self) -> AppResult<Arc<dyn BrokerConnection>> {
        let mut cached = self.connection.lock().await;
        if let Some(conn) = cached.as_ref() {
            if conn.is_open() {
                return Ok(Arc::clone(conn));
            }
            debug!(exchange = %self.exchange, "Cached broker connection is closed");
        }

        let conn = self.broker.connect().await?;
        conn.declare_exchange(&self.exchange).await?;
        info!(exchange = %self.exchange, "Publisher connected to broker");
        *cached = Some(Arc::clone(&conn));
        Ok(conn)
    }

    /// Forget `conn` if it is still the cached connection.
    async fn discard(&self, conn: &Arc<dyn BrokerConnection>) {
        let mut cached = self.connection.lock().await;
        if cached.as_ref().is_some_and(|c| Arc::ptr_eq(c, conn)) {
            *cached = None;
        }
    }
}
