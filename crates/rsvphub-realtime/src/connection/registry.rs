//! Connection registry: live push channels indexed by user.
//!
//! Every mutation runs under one mutex. Fan-out clones the user's channel
//! list under the lock and performs the sends without it, so a slow client
//! never blocks a concurrent connect or disconnect. Channels that refuse a
//! message are closed and removed afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use rsvphub_core::config::RealtimeConfig;
use rsvphub_core::types::id::UserId;

use crate::message::types::OutboundMessage;

use super::channel::{ConnectionId, PushChannel};

/// Owns every live push channel of the process.
#[derive(Debug)]
pub struct ConnectionRegistry {
    channels: Mutex<HashMap<UserId, Vec<Arc<dyn PushChannel>>>>,
    max_per_user: usize,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new(config: &RealtimeConfig) -> Self {
        Self::with_limit(config.max_connections_per_user)
    }

    /// Creates an empty registry allowing `max_per_user` channels per user.
    pub fn with_limit(max_per_user: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            max_per_user: max_per_user.max(1),
        }
    }

    /// Registers a channel under `user_id`.
    ///
    /// A user at the channel limit loses their oldest channel, which is closed.
    pub async fn connect(&self, user_id: UserId, channel: Arc<dyn PushChannel>) {
        let conn_id = channel.id();
        let evicted = {
            let mut channels = self.channels.lock().await;
            let list = channels.entry(user_id).or_default();
            let overflow = (list.len() + 1).saturating_sub(self.max_per_user);
            let evicted: Vec<_> = list.drain(..overflow).collect();
            list.push(channel);
            evicted
        };

        for oldest in evicted {
            warn!(
                user_id = %user_id,
                conn_id = %oldest.id(),
                max = self.max_per_user,
                "User at max connections, closing oldest"
            );
            oldest.close().await;
        }

        info!(user_id = %user_id, conn_id = %conn_id, "Push channel registered");
    }

    /// Removes a channel. Returns whether it was registered.
    pub async fn disconnect(&self, user_id: UserId, conn_id: ConnectionId) -> bool {
        let mut channels = self.channels.lock().await;
        let Some(list) = channels.get_mut(&user_id) else {
            return false;
        };

        let before = list.len();
        list.retain(|c| c.id() != conn_id);
        let removed = list.len() < before;
        if list.is_empty() {
            channels.remove(&user_id);
        }

        if removed {
            info!(user_id = %user_id, conn_id = %conn_id, "Push channel unregistered");
        }
        removed
    }

    /// Fans a message out to every channel of `user_id`.
    ///
    /// Returns how many channels accepted it; an offline user yields 0.
    pub async fn send_to_user(&self, user_id: UserId, message: &OutboundMessage) -> usize {
        let snapshot = {
            let channels = self.channels.lock().await;
            channels.get(&user_id).cloned().unwrap_or_default()
        };

        if snapshot.is_empty() {
            debug!(user_id = %user_id, "User offline, dropping push");
            return 0;
        }

        let mut delivered = 0;
        let mut failed = Vec::new();
        for channel in snapshot {
            match channel.send(message).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(user_id = %user_id, conn_id = %channel.id(), error = %e, "Push failed, dropping channel");
                    failed.push(channel);
                }
            }
        }

        if !failed.is_empty() {
            self.remove_failed(user_id, &failed).await;
            for channel in failed {
                channel.close().await;
            }
        }

        delivered
    }

    async fn remove_failed(&self, user_id: UserId, failed: &[Arc<dyn PushChannel>]) {
        let mut channels = self.channels.lock().await;
        if let Some(list) = channels.get_mut(&user_id) {
            list.retain(|c| !failed.iter().any(|f| f.id() == c.id()));
            if list.is_empty() {
                channels.remove(&user_id);
            }
        }
    }

    /// Total number of live channels.
    pub async fn connection_count(&self) -> usize {
        self.channels.lock().await.values().map(Vec::len).sum()
    }

    /// Number of users with at least one channel.
    pub async fn user_count(&self) -> usize {
        self.channels.lock().await.len()
    }

    /// Whether `user_id` has at least one channel.
    pub async fn is_online(&self, user_id: UserId) -> bool {
        self.channels.lock().await.contains_key(&user_id)
    }

    /// Closes and forgets every channel. Returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut channels = self.channels.lock().await;
            channels.drain().flat_map(|(_, list)| list).collect()
        };
        let count = drained.len();
        for channel in drained {
            channel.close().await;
        }
        info!(count, "Closed all push channels");
        count
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;
    use crate::connection::channel::PushError;
    use crate::connection::handle::ConnectionHandle;

    #[derive(Debug)]
    struct FakeChannel {
        id: ConnectionId,
        broken: bool,
        closed: AtomicBool,
        received: StdMutex<Vec<OutboundMessage>>,
    }

    impl FakeChannel {
        fn new(broken: bool) -> Arc<Self> {
            Arc::new(Self {
                id: Uuid::new_v4(),
                broken,
                closed: AtomicBool::new(false),
                received: StdMutex::new(Vec::new()),
            })
        }

        fn received(&self) -> usize {
            self.received.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PushChannel for FakeChannel {
        fn id(&self) -> ConnectionId {
            self.id
        }

        async fn send(&self, message: &OutboundMessage) -> Result<(), PushError> {
            if self.broken || self.closed.load(Ordering::SeqCst) {
                return Err(PushError::Closed);
            }
            self.received.lock().unwrap().push(message.clone());
            Ok(())
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn is_alive(&self) -> bool {
            !self.closed.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_failed_channel_is_removed_and_others_still_receive() {
        let registry = ConnectionRegistry::with_limit(5);
        let user = UserId::new();
        let healthy = FakeChannel::new(false);
        let broken = FakeChannel::new(true);
        registry.connect(user, healthy.clone()).await;
        registry.connect(user, broken.clone()).await;

        let delivered = registry.send_to_user(user, &OutboundMessage::Pong).await;

        assert_eq!(delivered, 1);
        assert_eq!(healthy.received(), 1);
        assert!(!broken.is_alive());
        assert_eq!(registry.connection_count().await, 1);

        registry.send_to_user(user, &OutboundMessage::Pong).await;
        assert_eq!(healthy.received(), 2);
    }

    #[tokio::test]
    async fn test_closed_handle_is_dropped_on_push() {
        let registry = ConnectionRegistry::with_limit(5);
        let user = UserId::new();
        let (live, mut live_rx) = ConnectionHandle::new(user, 4);
        let (gone, gone_rx) = ConnectionHandle::new(user, 4);
        drop(gone_rx);
        registry.connect(user, Arc::new(live)).await;
        registry.connect(user, Arc::new(gone)).await;

        assert_eq!(registry.send_to_user(user, &OutboundMessage::Pong).await, 1);
        assert_eq!(live_rx.recv().await, Some(OutboundMessage::Pong));
        assert_eq!(registry.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_last_failure_removes_user() {
        let registry = ConnectionRegistry::with_limit(5);
        let user = UserId::new();
        registry.connect(user, FakeChannel::new(true)).await;

        assert_eq!(registry.send_to_user(user, &OutboundMessage::Pong).await, 0);
        assert!(!registry.is_online(user).await);
        assert_eq!(registry.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_disconnect_removes_empty_user() {
        let registry = ConnectionRegistry::with_limit(5);
        let user = UserId::new();
        let first = FakeChannel::new(false);
        let second = FakeChannel::new(false);
        registry.connect(user, first.clone()).await;
        registry.connect(user, second.clone()).await;

        assert!(registry.disconnect(user, first.id).await);
        assert!(registry.is_online(user).await);
        assert!(registry.disconnect(user, second.id).await);
        assert!(!registry.is_online(user).await);
        assert!(!registry.disconnect(user, second.id).await);
    }

    #[tokio::test]
    async fn test_offline_user_gets_nothing() {
        let registry = ConnectionRegistry::with_limit(5);
        assert_eq!(
            registry.send_to_user(UserId::new(), &OutboundMessage::Pong).await,
            0
        );
    }

    #[tokio::test]
    async fn test_limit_evicts_oldest() {
        let registry = ConnectionRegistry::with_limit(2);
        let user = UserId::new();
        let oldest = FakeChannel::new(false);
        let middle = FakeChannel::new(false);
        let newest = FakeChannel::new(false);
        registry.connect(user, oldest.clone()).await;
        registry.connect(user, middle.clone()).await;
        registry.connect(user, newest.clone()).await;

        assert!(!oldest.is_alive());
        assert_eq!(registry.connection_count().await, 2);
        registry.send_to_user(user, &OutboundMessage::Pong).await;
        assert_eq!(oldest.received(), 0);
        assert_eq!(middle.received(), 1);
        assert_eq!(newest.received(), 1);
    }

    #[tokio::test]
    async fn test_close_all() {
        let registry = ConnectionRegistry::with_limit(5);
        let a = FakeChannel::new(false);
        let b = FakeChannel::new(false);
        registry.connect(UserId::new(), a.clone()).await;
        registry.connect(UserId::new(), b.clone()).await;

        assert_eq!(registry.close_all().await, 2);
        assert!(!a.is_alive());
        assert!(!b.is_alive());
        assert_eq!(registry.user_count().await, 0);
    }
}
