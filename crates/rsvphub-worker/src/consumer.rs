//! Notification consumer: connects to the broker, binds the durable queue
//! and feeds every delivery through the dispatcher.
//!
//! Lifecycle: `Disconnected → Connecting → Connected → Consuming`. A lost
//! connection goes back to `Connecting`. Each connect cycle makes a bounded
//! number of attempts with a fixed delay; exhausting them is fatal and
//! leaves the consumer `Failed`.
//!
//! Every delivery is acknowledged after its handler ran, whether the handler
//! succeeded or not (log-and-ack). A delivery whose ack is lost to a dropped
//! connection is redelivered after the reconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{RwLock, watch};
use tracing::{debug, error, info, warn};

use rsvphub_core::config::{BrokerConfig, WorkerConfig};
use rsvphub_core::error::AppError;
use rsvphub_core::result::AppResult;
use rsvphub_core::traits::broker::{BrokerConnection, Delivery, MessageBroker, QueueBinding};

use crate::dispatcher::{HandlerError, MessageDispatcher};

/// Where the consumer is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConsumerState {
    /// Not connected; about to connect.
    Disconnected,
    /// Connection attempt `attempt` is in progress.
    Connecting { attempt: u32 },
    /// Handshake done; declaring the exchange and queue.
    Connected,
    /// Reading deliveries.
    Consuming,
    /// Stopped by shutdown.
    Stopped,
    /// Gave up after the bounded retries.
    Failed { reason: String },
}

/// Running counters, shared with the supervisor.
#[derive(Debug, Default)]
pub struct ConsumerStats {
    processed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    last_error: RwLock<Option<String>>,
}

impl ConsumerStats {
    /// Messages handled successfully.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Messages with nothing to do (unknown type, missing entities).
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Messages whose handler failed.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// The most recent handler or connection error.
    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    async fn record_error(&self, error: String) {
        *self.last_error.write().await = Some(error);
    }
}

enum ConsumeEnd {
    Shutdown,
    Lost(AppError),
}

/// Consumes the notification queue until shut down or fatally disconnected.
#[derive(Debug)]
pub struct NotificationConsumer {
    broker: Arc<dyn MessageBroker>,
    binding: QueueBinding,
    consumer_name: String,
    batch_size: usize,
    block: Duration,
    max_retries: u32,
    retry_delay: Duration,
    dispatcher: Arc<MessageDispatcher>,
    state: watch::Sender<ConsumerState>,
    stats: Arc<ConsumerStats>,
}

impl NotificationConsumer {
    /// Create a consumer for the configured queue.
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        broker_config: &BrokerConfig,
        worker_config: &WorkerConfig,
        dispatcher: MessageDispatcher,
    ) -> Self {
        let (state, _) = watch::channel(ConsumerState::Disconnected);
        Self {
            broker,
            binding: QueueBinding::new(
                broker_config.exchange.clone(),
                broker_config.queue.clone(),
                broker_config.binding.clone(),
            ),
            consumer_name: broker_config.consumer_name.clone(),
            batch_size: broker_config.fetch_batch_size.max(1),
            block: Duration::from_millis(broker_config.block_timeout_ms),
            max_retries: worker_config.connect_max_retries.max(1),
            retry_delay: Duration::from_secs(worker_config.connect_retry_delay_seconds),
            dispatcher: Arc::new(dispatcher),
            state,
            stats: Arc::new(ConsumerStats::default()),
        }
    }

    /// Override the connect retry policy.
    pub fn with_retry_policy(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// Watch the lifecycle state.
    pub fn subscribe(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    /// Shared counters.
    pub fn stats(&self) -> Arc<ConsumerStats> {
        Arc::clone(&self.stats)
    }

    /// Run until `shutdown` turns true (or its sender is dropped).
    ///
    /// Returns `FatalStartup` when the broker stays unreachable for a whole
    /// connect cycle.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> AppResult<()> {
        info!(
            exchange = %self.binding.exchange,
            queue = %self.binding.queue,
            pattern = %self.binding.pattern,
            consumer = %self.consumer_name,
            "Notification consumer starting"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let Some(conn) = self.connect_with_retry(&mut shutdown).await? else {
                break;
            };

            match self.consume(conn.as_ref(), &mut shutdown).await {
                ConsumeEnd::Shutdown => {
                    conn.close().await;
                    break;
                }
                ConsumeEnd::Lost(e) => {
                    warn!(error = %e, "Broker connection lost, reconnecting");
                    self.stats.record_error(e.to_string()).await;
                    conn.close().await;
                    self.set_state(ConsumerState::Disconnected);
                }
            }
        }

        self.set_state(ConsumerState::Stopped);
        info!("Notification consumer stopped");
        Ok(())
    }

    /// One connect cycle. `Ok(None)` means shutdown arrived while waiting.
    async fn connect_with_retry(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> AppResult<Option<Arc<dyn BrokerConnection>>> {
        let mut last_error = String::new();

        for attempt in 1..=self.max_retries {
            self.set_state(ConsumerState::Connecting { attempt });

            match self.open().await {
                Ok(conn) => {
                    info!(attempt, "Consuming from broker");
                    self.set_state(ConsumerState::Consuming);
                    return Ok(Some(conn));
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts = self.max_retries,
                        error = %e,
                        "Broker connection attempt failed"
                    );
                    last_error = e.to_string();
                    self.stats.record_error(last_error.clone()).await;
                }
            }

            if attempt < self.max_retries {
                tokio::select! {
                    _ = tokio::time::sleep(self.retry_delay) => {}
                    _ = shutdown_requested(shutdown) => return Ok(None),
                }
            }
        }

        let reason = format!(
            "Broker unreachable after {} attempts: {last_error}",
            self.max_retries
        );
        error!(reason = %reason, "Notification consumer giving up");
        self.set_state(ConsumerState::Failed {
            reason: reason.clone(),
        });
        Err(AppError::fatal_startup(reason))
    }

    /// Handshake, then declare the exchange and bind the queue.
    async fn open(&self) -> AppResult<Arc<dyn BrokerConnection>> {
        let conn = self.broker.connect().await?;
        self.set_state(ConsumerState::Connected);

        let declared = async {
            conn.declare_exchange(&self.binding.exchange).await?;
            conn.declare_queue(&self.binding).await
        }
        .await;

        match declared {
            Ok(()) => Ok(conn),
            Err(e) => {
                conn.close().await;
                Err(e)
            }
        }
    }

    async fn consume(
        &self,
        conn: &dyn BrokerConnection,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ConsumeEnd {
        loop {
            let deliveries = tokio::select! {
                biased;
                _ = shutdown_requested(shutdown) => return ConsumeEnd::Shutdown,
                fetched = conn.fetch(&self.binding, &self.consumer_name, self.batch_size, self.block) => {
                    match fetched {
                        Ok(deliveries) => deliveries,
                        Err(e) => return ConsumeEnd::Lost(e),
                    }
                }
            };

            for delivery in deliveries {
                self.process(&delivery).await;
                if let Err(e) = conn.ack(&self.binding, &delivery).await {
                    return ConsumeEnd::Lost(e);
                }
            }
        }
    }

    async fn process(&self, delivery: &Delivery) {
        debug!(
            delivery_id = %delivery.delivery_id,
            routing_key = %delivery.routing_key,
            redelivered = delivery.redelivered,
            "Processing delivery"
        );

        match self.dispatcher.dispatch(&delivery.payload).await {
            Ok(()) => {
                self.stats.processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(HandlerError::Skipped(reason)) => {
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                info!(
                    delivery_id = %delivery.delivery_id,
                    routing_key = %delivery.routing_key,
                    reason = %reason,
                    "Delivery skipped"
                );
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    delivery_id = %delivery.delivery_id,
                    routing_key = %delivery.routing_key,
                    error = %e,
                    "Handler failed, acknowledging anyway"
                );
                self.stats.record_error(e.to_string()).await;
            }
        }
    }

    fn set_state(&self, state: ConsumerState) {
        self.state.send_replace(state);
    }
}

/// Resolves once shutdown is requested or the requesting side is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    // An Err means the sender was dropped, which also ends the consumer.
    let _ = shutdown.wait_for(|stop| *stop).await;
}
