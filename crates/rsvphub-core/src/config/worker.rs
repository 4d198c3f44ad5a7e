//! Notification consumer configuration.

use serde::{Deserialize, Serialize};

/// Background notification consumer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether the consumer is started with the server.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Broker connection attempts before giving up.
    #[serde(default = "default_connect_max_retries")]
    pub connect_max_retries: u32,
    /// Fixed delay between broker connection attempts, in seconds.
    #[serde(default = "default_connect_retry_delay")]
    pub connect_retry_delay_seconds: u64,
    /// How long shutdown waits for the consumer to stop, in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            connect_max_retries: default_connect_max_retries(),
            connect_retry_delay_seconds: default_connect_retry_delay(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_connect_max_retries() -> u32 {
    10
}

fn default_connect_retry_delay() -> u64 {
    5
}

fn default_shutdown_timeout() -> u64 {
    30
}
