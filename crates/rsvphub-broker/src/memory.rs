//! In-process broker with topic-exchange routing and at-least-once delivery.
//!
//! Queues keep every delivery pending until it is acknowledged; a consumer
//! that fetches again under the same name gets its pending deliveries back
//! before anything new, mirroring the Redis Streams backend. The broker also
//! exposes fault injection hooks (refused connects, dropped connections) and
//! a log of the most recent publishes.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;

use rsvphub_core::error::AppError;
use rsvphub_core::events::routing_key_matches;
use rsvphub_core::result::AppResult;
use rsvphub_core::traits::broker::{BrokerConnection, Delivery, MessageBroker, QueueBinding};

/// Publishes retained by [`MemoryBroker::published`]; older entries are dropped.
pub const PUBLISHED_LOG_CAPACITY: usize = 1024;

/// A message as it was handed to [`BrokerConnection::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone)]
struct Message {
    id: u64,
    routing_key: String,
    payload: Vec<u8>,
}

impl Message {
    fn delivery(&self, redelivered: bool) -> Delivery {
        Delivery {
            delivery_id: self.id.to_string(),
            routing_key: self.routing_key.clone(),
            payload: self.payload.clone(),
            redelivered,
        }
    }
}

#[derive(Debug)]
struct Queue {
    exchange: String,
    pattern: String,
    ready: VecDeque<Message>,
    /// Delivered but unacknowledged, keyed by message id, with the consumer name.
    pending: BTreeMap<u64, (String, Message)>,
}

#[derive(Debug, Default)]
struct State {
    exchanges: HashSet<String>,
    queues: HashMap<String, Queue>,
    published: VecDeque<PublishedMessage>,
    next_id: u64,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    notify: Notify,
    refuse_connects: AtomicU32,
    connects: AtomicU32,
    live: Mutex<Vec<Arc<MemoryConnection>>>,
}

/// In-process [`MessageBroker`]. Clones share the same exchanges and queues.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    /// Create a broker with no exchanges or queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next `count` connection attempts.
    pub fn fail_next_connects(&self, count: u32) {
        self.shared.refuse_connects.store(count, Ordering::SeqCst);
    }

    /// Number of successful connects so far.
    pub fn connect_count(&self) -> u32 {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// Close every open connection, as if the broker restarted.
    ///
    /// Exchanges, queues and pending deliveries survive.
    pub async fn drop_connections(&self) {
        let live = std::mem::take(&mut *self.shared.live.lock().await);
        for conn in &live {
            conn.open.store(false, Ordering::SeqCst);
        }
        self.shared.notify.notify_waiters();
        debug!(count = live.len(), "Dropped broker connections");
    }

    /// The last [`PUBLISHED_LOG_CAPACITY`] messages published, oldest first.
    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.shared
            .state
            .lock()
            .await
            .published
            .iter()
            .cloned()
            .collect()
    }

    /// Messages waiting in `queue` that no consumer has fetched yet.
    pub async fn ready_count(&self, queue: &str) -> usize {
        let state = self.shared.state.lock().await;
        state.queues.get(queue).map_or(0, |q| q.ready.len())
    }

    /// Messages fetched from `queue` but not yet acknowledged.
    pub async fn pending_count(&self, queue: &str) -> usize {
        let state = self.shared.state.lock().await;
        state.queues.get(queue).map_or(0, |q| q.pending.len())
    }
}

#[async_trait]
impl MessageBroker for MemoryBroker {
    async fn connect(&self) -> AppResult<Arc<dyn BrokerConnection>> {
        let refused = self
            .shared
            .refuse_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(AppError::broker("Connection refused"));
        }

        let conn = Arc::new(MemoryConnection {
            shared: Arc::clone(&self.shared),
            open: AtomicBool::new(true),
        });
        let mut live = self.shared.live.lock().await;
        live.retain(|c| c.open.load(Ordering::SeqCst));
        live.push(Arc::clone(&conn));
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        Ok(conn)
    }
}

/// A connection to a [`MemoryBroker`].
pub struct MemoryConnection {
    shared: Arc<Shared>,
    open: AtomicBool,
}

// The broker's live list points back at its connections.
impl fmt::Debug for MemoryConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("open", &self.open.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl MemoryConnection {
    fn ensure_open(&self) -> AppResult<()> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::broker("Connection closed"))
        }
    }
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn declare_exchange(&self, exchange: &str) -> AppResult<()> {
        self.ensure_open()?;
        self.shared
            .state
            .lock()
            .await
            .exchanges
            .insert(exchange.to_string());
        Ok(())
    }

    async fn publish(&self, exchange: &str, routing_key: &str, payload: &[u8]) -> AppResult<()> {
        self.ensure_open()?;
        {
            let mut state = self.shared.state.lock().await;
            if !state.exchanges.contains(exchange) {
                return Err(AppError::broker(format!(
                    "Exchange '{exchange}' is not declared"
                )));
            }
            state.next_id += 1;
            let message = Message {
                id: state.next_id,
                routing_key: routing_key.to_string(),
                payload: payload.to_vec(),
            };
            for queue in state.queues.values_mut() {
                if queue.exchange == exchange && routing_key_matches(&queue.pattern, routing_key) {
                    queue.ready.push_back(message.clone());
                }
            }
            if state.published.len() == PUBLISHED_LOG_CAPACITY {
                state.published.pop_front();
            }
            state.published.push_back(PublishedMessage {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                payload: payload.to_vec(),
            });
        }
        self.shared.notify.notify_waiters();
        Ok(())
    }

    async fn declare_queue(&self, binding: &QueueBinding) -> AppResult<()> {
        self.ensure_open()?;
        let mut state = self.shared.state.lock().await;
        if !state.exchanges.contains(&binding.exchange) {
            return Err(AppError::broker(format!(
                "Exchange '{}' is not declared",
                binding.exchange
            )));
        }
        let queue = state
            .queues
            .entry(binding.queue.clone())
            .or_insert_with(|| Queue {
                exchange: binding.exchange.clone(),
                pattern: binding.pattern.clone(),
                ready: VecDeque::new(),
                pending: BTreeMap::new(),
            });
        queue.exchange = binding.exchange.clone();
        queue.pattern = binding.pattern.clone();
        Ok(())
    }

    async fn fetch(
        &self,
        binding: &QueueBinding,
        consumer: &str,
        max: usize,
        block: Duration,
    ) -> AppResult<Vec<Delivery>> {
        let deadline = Instant::now() + block;
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            self.ensure_open()?;
            {
                let mut state = self.shared.state.lock().await;
                let queue = state.queues.get_mut(&binding.queue).ok_or_else(|| {
                    AppError::broker(format!("Queue '{}' is not declared", binding.queue))
                })?;

                let redelivery: Vec<Delivery> = queue
                    .pending
                    .values()
                    .filter(|(owner, _)| owner == consumer)
                    .take(max)
                    .map(|(_, message)| message.delivery(true))
                    .collect();
                if !redelivery.is_empty() {
                    return Ok(redelivery);
                }

                let mut fresh = Vec::new();
                while fresh.len() < max {
                    let Some(message) = queue.ready.pop_front() else {
                        break;
                    };
                    fresh.push(message.delivery(false));
                    queue
                        .pending
                        .insert(message.id, (consumer.to_string(), message));
                }
                if !fresh.is_empty() {
                    return Ok(fresh);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            if tokio::time::timeout(deadline - now, notified).await.is_err() {
                self.ensure_open()?;
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, binding: &QueueBinding, delivery: &Delivery) -> AppResult<()> {
        self.ensure_open()?;
        let id: u64 = delivery.delivery_id.parse().map_err(|_| {
            AppError::broker(format!("Malformed delivery id '{}'", delivery.delivery_id))
        })?;
        let mut state = self.shared.state.lock().await;
        if let Some(queue) = state.queues.get_mut(&binding.queue) {
            queue.pending.remove(&id);
        }
        Ok(())
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
    }
}
