//! Broker selection from configuration.

use std::sync::Arc;

use tracing::info;

use rsvphub_core::config::BrokerConfig;
use rsvphub_core::error::AppError;
use rsvphub_core::result::AppResult;
use rsvphub_core::traits::broker::MessageBroker;

/// Build the configured broker.
///
/// No connection is opened here; publishers and consumers connect lazily.
/// Publishers and consumers of one process must share the returned handle;
/// the in-memory provider only routes within a single instance.
pub fn broker_from_config(config: &BrokerConfig) -> AppResult<Arc<dyn MessageBroker>> {
    match config.provider.as_str() {
        #[cfg(feature = "redis-backend")]
        "redis" => {
            info!("Initializing Redis Streams broker");
            Ok(Arc::new(crate::redis::RedisStreamsBroker::new(config)?))
        }
        "memory" => {
            info!("Initializing in-memory broker");
            Ok(Arc::new(crate::memory::MemoryBroker::new()))
        }
        other => Err(AppError::configuration(format!(
            "Unknown broker provider: '{other}'. Supported: memory, redis"
        ))),
    }
}
