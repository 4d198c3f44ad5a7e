//! Redis Streams connection and broker factory.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamId, StreamReadReply};
use redis::{Client, RedisError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use rsvphub_core::config::{BrokerConfig, mask_url_password};
use rsvphub_core::error::{AppError, ErrorKind};
use rsvphub_core::events::routing_key_matches;
use rsvphub_core::result::AppResult;
use rsvphub_core::traits::broker::{BrokerConnection, Delivery, MessageBroker, QueueBinding};

/// Interval between non-blocking reads while waiting for new entries.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Content type recorded on every entry.
const CONTENT_TYPE: &str = "application/json";

/// Opens connections to a Redis server acting as the broker.
#[derive(Debug, Clone)]
pub struct RedisStreamsBroker {
    client: Client,
    masked_url: String,
    key_prefix: String,
    max_stream_length: u64,
}

impl RedisStreamsBroker {
    /// Validate the URL and prepare a broker. Does not connect.
    pub fn new(config: &BrokerConfig) -> AppResult<Self> {
        let client = Client::open(config.url.as_str()).map_err(|e| {
            AppError::with_source(ErrorKind::Configuration, "Invalid broker URL", e)
        })?;
        Ok(Self {
            client,
            masked_url: mask_url_password(&config.url),
            key_prefix: config.key_prefix.clone(),
            max_stream_length: config.max_stream_length,
        })
    }
}

#[async_trait]
impl MessageBroker for RedisStreamsBroker {
    async fn connect(&self) -> AppResult<Arc<dyn BrokerConnection>> {
        debug!(url = %self.masked_url, "Connecting to Redis Streams broker");
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Broker, format!("Broker connect failed: {e}"), e)
            })?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Broker, format!("Broker handshake failed: {e}"), e)
            })?;

        info!(url = %self.masked_url, "Connected to Redis Streams broker");
        Ok(Arc::new(RedisStreamsConnection {
            conn,
            key_prefix: self.key_prefix.clone(),
            max_stream_length: self.max_stream_length,
            open: AtomicBool::new(true),
        }))
    }
}

/// One multiplexed connection to the broker.
pub struct RedisStreamsConnection {
    conn: MultiplexedConnection,
    key_prefix: String,
    max_stream_length: u64,
    open: AtomicBool,
}

impl std::fmt::Debug for RedisStreamsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStreamsConnection")
            .field("key_prefix", &self.key_prefix)
            .field("open", &self.open.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl RedisStreamsConnection {
    fn stream_key(&self, exchange: &str) -> String {
        format!("{}{exchange}", self.key_prefix)
    }

    fn bindings_key(&self, exchange: &str) -> String {
        format!("{}{exchange}:bindings", self.key_prefix)
    }

    fn exchanges_key(&self) -> String {
        format!("{}exchanges", self.key_prefix)
    }

    /// Map a Redis error, marking the connection closed when it is broken.
    fn fail(&self, context: &str, e: RedisError) -> AppError {
        if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
            self.open.store(false, Ordering::SeqCst);
        }
        AppError::with_source(ErrorKind::Broker, format!("{context}: {e}"), e)
    }

    fn ensure_open(&self) -> AppResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(AppError::broker("Connection closed"))
        }
    }

    async fn read_group(
        &self,
        stream: &str,
        binding: &QueueBinding,
        consumer: &str,
        max: usize,
        from: &str,
    ) -> AppResult<Vec<StreamId>> {
        let mut conn = self.conn.clone();
        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&binding.queue)
            .arg(consumer)
            .arg("COUNT")
            .arg(max)
            .arg("STREAMS")
            .arg(stream)
            .arg(from)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.fail("XREADGROUP failed", e))?;

        Ok(reply
            .map(|r| r.keys.into_iter().flat_map(|k| k.ids).collect())
            .unwrap_or_default())
    }

    async fn ack_id(&self, stream: &str, group: &str, id: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("XACK")
            .arg(stream)
            .arg(group)
            .arg(id)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.fail("XACK failed", e))?;
        Ok(())
    }
}

/// `XADD` for one entry, trimmed to roughly `max_len` entries when non-zero.
fn xadd_command(stream: &str, max_len: u64, routing_key: &str, payload: &[u8]) -> redis::Cmd {
    let mut cmd = redis::cmd("XADD");
    cmd.arg(stream);
    if max_len > 0 {
        cmd.arg("MAXLEN").arg("~").arg(max_len);
    }
    cmd.arg("*")
        .arg("routing_key")
        .arg(routing_key)
        .arg("content_type")
        .arg(CONTENT_TYPE)
        .arg("payload")
        .arg(payload);
    cmd
}

fn to_delivery(entry: &StreamId, redelivered: bool) -> Option<Delivery> {
    let routing_key: String = entry.get("routing_key")?;
    let payload: Vec<u8> = entry.get("payload")?;
    Some(Delivery {
        delivery_id: entry.id.clone(),
        routing_key,
        payload,
        redelivered,
    })
}

#[async_trait]
impl BrokerConnection for RedisStreamsConnection {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn declare_exchange(&self, exchange: &str) -> AppResult<()> {
        self.ensure_open()?;
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("SADD")
            .arg(self.exchanges_key())
            .arg(exchange)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.fail("Declaring exchange failed", e))?;
        Ok(())
    }

    async fn publish(&self, exchange: &str, routing_key: &str, payload: &[u8]) -> AppResult<()> {
        self.ensure_open()?;
        let mut conn = self.conn.clone();
        let id: String = xadd_command(
            &self.stream_key(exchange),
            self.max_stream_length,
            routing_key,
            payload,
        )
        .query_async(&mut conn)
            .await
            .map_err(|e| self.fail("XADD failed", e))?;
        debug!(exchange, routing_key, entry_id = %id, "Published entry");
        Ok(())
    }

    async fn declare_queue(&self, binding: &QueueBinding) -> AppResult<()> {
        self.ensure_open()?;
        let stream = self.stream_key(&binding.exchange);
        let mut conn = self.conn.clone();

        let created: Result<String, RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&stream)
            .arg(&binding.queue)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match created {
            Ok(_) => info!(stream = %stream, queue = %binding.queue, "Created consumer group"),
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!(stream = %stream, queue = %binding.queue, "Consumer group already exists");
            }
            Err(e) => return Err(self.fail("Declaring queue failed", e)),
        }

        let _: i64 = redis::cmd("HSET")
            .arg(self.bindings_key(&binding.exchange))
            .arg(&binding.queue)
            .arg(&binding.pattern)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.fail("Recording binding failed", e))?;
        Ok(())
    }

    async fn fetch(
        &self,
        binding: &QueueBinding,
        consumer: &str,
        max: usize,
        block: Duration,
    ) -> AppResult<Vec<Delivery>> {
        self.ensure_open()?;
        let stream = self.stream_key(&binding.exchange);

        // Entries this consumer received earlier but never acknowledged.
        let pending = self.read_group(&stream, binding, consumer, max, "0").await?;
        let (entries, redelivered) = if pending.is_empty() {
            let deadline = Instant::now() + block;
            let fresh = loop {
                let fresh = self.read_group(&stream, binding, consumer, max, ">").await?;
                let now = Instant::now();
                if !fresh.is_empty() || now >= deadline {
                    break fresh;
                }
                tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
            };
            (fresh, false)
        } else {
            (pending, true)
        };

        let mut deliveries = Vec::with_capacity(entries.len());
        for entry in &entries {
            match to_delivery(entry, redelivered) {
                Some(delivery) if routing_key_matches(&binding.pattern, &delivery.routing_key) => {
                    deliveries.push(delivery);
                }
                Some(delivery) => {
                    debug!(
                        routing_key = %delivery.routing_key,
                        pattern = %binding.pattern,
                        "Skipping entry outside binding"
                    );
                    self.ack_id(&stream, &binding.queue, &entry.id).await?;
                }
                None => {
                    warn!(entry_id = %entry.id, "Skipping malformed stream entry");
                    self.ack_id(&stream, &binding.queue, &entry.id).await?;
                }
            }
        }
        Ok(deliveries)
    }

    async fn ack(&self, binding: &QueueBinding, delivery: &Delivery) -> AppResult<()> {
        self.ensure_open()?;
        let stream = self.stream_key(&binding.exchange);
        self.ack_id(&stream, &binding.queue, &delivery.delivery_id)
            .await
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}
