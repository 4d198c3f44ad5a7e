//! Message broker configuration.

use serde::{Deserialize, Serialize};

/// Durable topic broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker provider: `"memory"` or `"redis"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Broker connection URL (Redis Streams backend).
    #[serde(default = "default_url")]
    pub url: String,
    /// Key prefix for the stream and binding keys.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Topic exchange that domain events are published to.
    #[serde(default = "default_exchange")]
    pub exchange: String,
    /// Durable queue the notification consumer reads from.
    #[serde(default = "default_queue")]
    pub queue: String,
    /// Routing pattern binding the queue to the exchange.
    #[serde(default = "default_binding")]
    pub binding: String,
    /// Consumer name within the queue; unacknowledged deliveries are
    /// handed back to the same name after a restart.
    #[serde(default = "default_consumer_name")]
    pub consumer_name: String,
    /// Maximum deliveries fetched per poll.
    #[serde(default = "default_batch_size")]
    pub fetch_batch_size: usize,
    /// How long a poll blocks waiting for new deliveries, in milliseconds.
    #[serde(default = "default_block_timeout")]
    pub block_timeout_ms: u64,
    /// Approximate cap on entries kept per exchange stream (`XADD MAXLEN ~`).
    /// `0` keeps every entry.
    #[serde(default = "default_max_stream_length")]
    pub max_stream_length: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            url: default_url(),
            key_prefix: default_key_prefix(),
            exchange: default_exchange(),
            queue: default_queue(),
            binding: default_binding(),
            consumer_name: default_consumer_name(),
            fetch_batch_size: default_batch_size(),
            block_timeout_ms: default_block_timeout(),
            max_stream_length: default_max_stream_length(),
        }
    }
}

fn default_provider() -> String {
    "redis".to_string()
}

fn default_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_key_prefix() -> String {
    "rsvphub:".to_string()
}

fn default_exchange() -> String {
    "rsvphub.events".to_string()
}

fn default_queue() -> String {
    "rsvphub.notifications".to_string()
}

fn default_binding() -> String {
    "rsvp.*".to_string()
}

fn default_consumer_name() -> String {
    "rsvphub-worker".to_string()
}

fn default_batch_size() -> usize {
    16
}

fn default_block_timeout() -> u64 {
    1000
}

fn default_max_stream_length() -> u64 {
    100_000
}
