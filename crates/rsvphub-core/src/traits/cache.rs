//! Key-value cache seam.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::result::AppResult;

/// A string-valued cache with per-entry expiry.
///
/// Values are JSON text. Implementations own key prefixing. An `Err` from
/// any method means the backend is unavailable; read paths fall through to
/// the database and write paths log and move on.
#[async_trait]
pub trait CacheProvider: Send + Sync + std::fmt::Debug + 'static {
    /// Fetch a live entry.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// Store with the provider's configured TTL.
    async fn set_default(&self, key: &str, value: &str) -> AppResult<()>;

    /// Remove one key. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> AppResult<()>;

    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// Remove every key matching a `*`/`?` glob such as `rsvphub:v1:events:list:*`,
    /// returning how many were removed.
    async fn delete_pattern(&self, pattern: &str) -> AppResult<u64>;

    /// `true` when the backend answers a round trip.
    async fn health_check(&self) -> AppResult<bool>;

    /// [`get`](Self::get) and decode.
    async fn get_json<T>(&self, key: &str) -> AppResult<Option<T>>
    where
        Self: Sized,
        T: DeserializeOwned + Send,
    {
        self.get(key)
            .await?
            .map(|raw| serde_json::from_str(&raw).map_err(Into::into))
            .transpose()
    }

    /// Encode and [`set`](Self::set).
    async fn set_json<T>(&self, key: &str, value: &T, ttl: Duration) -> AppResult<()>
    where
        Self: Sized,
        T: Serialize + Send + Sync,
    {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw, ttl).await
    }
}
