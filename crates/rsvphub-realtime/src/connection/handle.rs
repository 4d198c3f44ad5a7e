//! Buffered push channel backed by an mpsc queue.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Notify, mpsc};
use uuid::Uuid;

use rsvphub_core::types::id::UserId;

use crate::message::types::OutboundMessage;

use super::channel::{ConnectionId, PushChannel, PushError};

/// A handle to a single client connection.
///
/// The socket task owns the receiving half and writes every message it
/// drains to the client; it also waits on [`ConnectionHandle::closed`] so
/// the registry can tear the socket down.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique connection ID
    pub id: ConnectionId,
    /// User who owns this connection
    pub user_id: UserId,
    /// When the connection was established
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<OutboundMessage>,
    alive: AtomicBool,
    close_signal: Notify,
}

impl ConnectionHandle {
    /// Create a handle and the receiver the socket task drains.
    pub fn new(user_id: UserId, buffer: usize) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let handle = Self {
            id: Uuid::new_v4(),
            user_id,
            connected_at: Utc::now(),
            sender,
            alive: AtomicBool::new(true),
            close_signal: Notify::new(),
        };
        (handle, receiver)
    }

    /// Resolves once the handle has been closed.
    ///
    /// Any number of tasks may wait concurrently.
    pub async fn closed(&self) {
        let notified = self.close_signal.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent close is not missed.
        notified.as_mut().enable();
        if !self.is_alive() {
            return;
        }
        notified.await;
    }

    fn mark_dead(&self) -> bool {
        self.alive.swap(false, Ordering::SeqCst)
    }
}

#[async_trait]
impl PushChannel for ConnectionHandle {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), PushError> {
        if !self.is_alive() {
            return Err(PushError::Closed);
        }
        match self.sender.try_send(message.clone()) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(conn_id = %self.id, "Connection send buffer full");
                Err(PushError::Backpressure)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.mark_dead();
                Err(PushError::Closed)
            }
        }
    }

    async fn close(&self) {
        if self.mark_dead() {
            self.close_signal.notify_waiters();
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_reaches_receiver() {
        let (handle, mut rx) = ConnectionHandle::new(UserId::new(), 4);
        handle.send(&OutboundMessage::Pong).await.unwrap();
        assert_eq!(rx.recv().await, Some(OutboundMessage::Pong));
    }

    #[tokio::test]
    async fn test_dropped_receiver_marks_dead() {
        let (handle, rx) = ConnectionHandle::new(UserId::new(), 4);
        drop(rx);
        assert_eq!(handle.send(&OutboundMessage::Pong).await, Err(PushError::Closed));
        assert!(!handle.is_alive());
    }

    #[tokio::test]
    async fn test_full_buffer_is_backpressure() {
        let (handle, _rx) = ConnectionHandle::new(UserId::new(), 1);
        handle.send(&OutboundMessage::Pong).await.unwrap();
        assert_eq!(
            handle.send(&OutboundMessage::Pong).await,
            Err(PushError::Backpressure)
        );
    }

    #[tokio::test]
    async fn test_close_wakes_every_waiter() {
        let (handle, _rx) = ConnectionHandle::new(UserId::new(), 1);
        let handle = std::sync::Arc::new(handle);
        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.closed().await })
            })
            .collect();
        tokio::task::yield_now().await;
        handle.close().await;
        for waiter in waiters {
            tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
                .await
                .expect("waiter woken")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_close_wakes_waiter() {
        let (handle, _rx) = ConnectionHandle::new(UserId::new(), 1);
        handle.close().await;
        handle.closed().await;
        assert!(!handle.is_alive());
        assert_eq!(handle.send(&OutboundMessage::Pong).await, Err(PushError::Closed));
    }
}
