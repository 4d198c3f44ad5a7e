//! Supervisor owning the notification consumer task.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use rsvphub_core::error::AppError;
use rsvphub_core::result::AppResult;

use crate::consumer::{ConsumerState, ConsumerStats, NotificationConsumer};

/// Point-in-time view of the consumer for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ConsumerHealth {
    /// Lifecycle state.
    #[serde(flatten)]
    pub state: ConsumerState,
    /// Messages handled successfully.
    pub processed: u64,
    /// Messages with nothing to do.
    pub skipped: u64,
    /// Messages whose handler failed.
    pub failed: u64,
    /// Most recent error, if any.
    pub last_error: Option<String>,
}

impl ConsumerHealth {
    /// Whether the consumer is reading deliveries.
    pub fn is_healthy(&self) -> bool {
        self.state == ConsumerState::Consuming
    }
}

/// Starts, observes and stops the notification consumer.
#[derive(Debug)]
pub struct ConsumerSupervisor {
    state: watch::Receiver<ConsumerState>,
    stats: Arc<ConsumerStats>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<AppResult<()>>>>,
}

impl ConsumerSupervisor {
    /// Spawn the consumer on the runtime.
    pub fn start(consumer: NotificationConsumer) -> Self {
        let state = consumer.subscribe();
        let stats = consumer.stats();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let result = consumer.run(shutdown_rx).await;
            if let Err(e) = &result {
                error!(error = %e, "Notification consumer terminated");
            }
            result
        });

        info!("Notification consumer supervised");
        Self {
            state,
            stats,
            shutdown,
            task: Mutex::new(Some(task)),
        }
    }

    /// Current health snapshot.
    pub async fn health(&self) -> ConsumerHealth {
        let state = self.state.borrow().clone();
        ConsumerHealth {
            state,
            processed: self.stats.processed(),
            skipped: self.stats.skipped(),
            failed: self.stats.failed(),
            last_error: self.stats.last_error().await,
        }
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConsumerState> {
        self.state.clone()
    }

    /// Resolves with the failure reason once the consumer has given up.
    pub async fn failed(&self) -> String {
        let mut state = self.state.clone();
        let reason = state
            .wait_for(|s| matches!(s, ConsumerState::Failed { .. }))
            .await
            .map(|current| match &*current {
                ConsumerState::Failed { reason } => reason.clone(),
                _ => String::new(),
            });
        match reason {
            Ok(reason) => reason,
            // The consumer is gone without failing; never resolve.
            Err(_) => std::future::pending::<String>().await,
        }
    }

    /// Ask the consumer to stop and wait up to `timeout` for it.
    ///
    /// Returns the consumer's own error if it had already failed.
    pub async fn shutdown(&self, timeout: Duration) -> AppResult<()> {
        self.shutdown.send_replace(true);

        let Some(mut task) = self.task.lock().await.take() else {
            return Ok(());
        };

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(result)) => {
                info!("Notification consumer shut down");
                result
            }
            Ok(Err(e)) => Err(AppError::internal(format!(
                "Notification consumer task panicked: {e}"
            ))),
            Err(_) => {
                warn!(?timeout, "Notification consumer did not stop in time, aborting");
                task.abort();
                Err(AppError::internal("Notification consumer shutdown timed out"))
            }
        }
    }
}
