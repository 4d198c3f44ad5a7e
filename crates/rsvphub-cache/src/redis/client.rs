//! Shared Redis connection for the cache provider.

use redis::Client;
use redis::aio::ConnectionManager;
use tracing::info;

use rsvphub_core::config::cache::RedisCacheConfig;
use rsvphub_core::config::mask_url_password;
use rsvphub_core::error::{AppError, ErrorKind};
use rsvphub_core::result::AppResult;

/// Multiplexed, auto-reconnecting Redis connection plus the key namespace.
#[derive(Debug, Clone)]
pub struct RedisClient {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisClient {
    /// Open the connection described by `config`.
    pub async fn connect(config: &RedisCacheConfig) -> AppResult<Self> {
        info!(url = %mask_url_password(&config.url), "Connecting to Redis cache");

        let client = Client::open(config.url.as_str()).map_err(|e| {
            AppError::with_source(ErrorKind::Cache, "Failed to create Redis client", e)
        })?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            AppError::with_source(ErrorKind::Cache, "Failed to connect to Redis", e)
        })?;

        info!("Connected to Redis cache");
        Ok(Self {
            conn,
            key_prefix: config.key_prefix.clone(),
        })
    }

    /// A clone of the shared connection; clones multiplex one socket.
    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }

    /// `key` inside the configured namespace.
    pub fn prefixed_key(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }
}
