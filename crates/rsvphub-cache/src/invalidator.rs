//! Best-effort eviction of cached event reads after writes.
//!
//! Eviction failures are logged and swallowed: a stale entry heals itself
//! when its TTL runs out, so it never justifies failing the write.

use std::sync::Arc;

use tracing::{debug, warn};

use rsvphub_core::traits::cache::CacheProvider;
use rsvphub_core::types::id::EventId;

use crate::keys;

/// Evicts event detail and listing entries.
#[derive(Debug, Clone)]
pub struct CacheInvalidator {
    cache: Arc<dyn CacheProvider>,
}

impl CacheInvalidator {
    /// Create an invalidator over the shared cache.
    pub fn new(cache: Arc<dyn CacheProvider>) -> Self {
        Self { cache }
    }

    /// Evict the detail entry of `event_id` and every cached listing page.
    ///
    /// Listing pages are evicted wholesale: any page may contain the event.
    /// Evicting keys that are already gone is a no-op.
    pub async fn invalidate(&self, event_id: EventId) {
        let detail = keys::event_detail(event_id);
        if let Err(e) = self.cache.delete(&detail).await {
            warn!(event_id = %event_id, error = %e, "Failed to evict cached event detail");
        }
        self.evict_pattern(&keys::event_list_pattern()).await;
    }

    /// Evict every cached listing page and listing total.
    ///
    /// Used when the set of events changes, not just their counts.
    pub async fn invalidate_lists(&self) {
        self.evict_pattern(&keys::event_list_pattern()).await;
        self.evict_pattern(&keys::event_count_pattern()).await;
    }

    async fn evict_pattern(&self, pattern: &str) {
        match self.cache.delete_pattern(pattern).await {
            Ok(removed) => debug!(pattern, removed, "Evicted cached event listings"),
            Err(e) => warn!(pattern, error = %e, "Failed to evict cached event listings"),
        }
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use rsvphub_core::config::cache::MemoryCacheConfig;
    use rsvphub_core::error::AppError;
    use rsvphub_core::result::AppResult;
    use rsvphub_core::types::pagination::PageRequest;
    use rsvphub_entity::event::EventFilter;

    use crate::memory::MemoryCacheProvider;

    /// A cache whose backend is always down.
    #[derive(Debug)]
    struct DownCache;

    #[async_trait]
    impl CacheProvider for DownCache {
        async fn get(&self, _key: &str) -> AppResult<Option<String>> {
            Err(AppError::cache("connection refused"))
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> AppResult<()> {
            Err(AppError::cache("connection refused"))
        }
        async fn set_default(&self, _key: &str, _value: &str) -> AppResult<()> {
            Err(AppError::cache("connection refused"))
        }
        async fn delete(&self, _key: &str) -> AppResult<()> {
            Err(AppError::cache("connection refused"))
        }
        async fn exists(&self, _key: &str) -> AppResult<bool> {
            Err(AppError::cache("connection refused"))
        }
        async fn delete_pattern(&self, _pattern: &str) -> AppResult<u64> {
            Err(AppError::cache("connection refused"))
        }
        async fn health_check(&self) -> AppResult<bool> {
            Ok(false)
        }
    }

    fn memory_cache() -> Arc<dyn CacheProvider> {
        Arc::new(MemoryCacheProvider::new(&MemoryCacheConfig::default(), 300))
    }

    #[tokio::test]
    async fn test_invalidate_evicts_detail_and_lists_only() {
        let cache = memory_cache();
        let event_id = EventId::new();
        let other = EventId::new();
        let list = keys::event_list(&EventFilter::default(), &PageRequest::default());
        let count = keys::event_count(&EventFilter::default());
        for key in [&keys::event_detail(event_id), &keys::event_detail(other), &list, &count] {
            cache.set_default(key, "{}").await.unwrap();
        }

        let invalidator = CacheInvalidator::new(cache.clone());
        invalidator.invalidate(event_id).await;

        assert!(!cache.exists(&keys::event_detail(event_id)).await.unwrap());
        assert!(!cache.exists(&list).await.unwrap());
        assert!(cache.exists(&keys::event_detail(other)).await.unwrap());
        assert!(cache.exists(&count).await.unwrap());
    }

    #[tokio::test]
    async fn test_invalidate_twice_is_a_no_op() {
        let cache = memory_cache();
        let invalidator = CacheInvalidator::new(cache.clone());
        let event_id = EventId::new();
        invalidator.invalidate(event_id).await;
        invalidator.invalidate(event_id).await;
        assert!(!cache.exists(&keys::event_detail(event_id)).await.unwrap());
    }

    #[tokio::test]
    async fn test_backend_failure_is_swallowed() {
        let invalidator = CacheInvalidator::new(Arc::new(DownCache));
        invalidator.invalidate(EventId::new()).await;
        invalidator.invalidate_lists().await;
    }

    #[tokio::test]
    async fn test_invalidate_lists_evicts_counts() {
        let cache = memory_cache();
        let count = keys::event_count(&EventFilter::default());
        cache.set_default(&count, "3").await.unwrap();
        CacheInvalidator::new(cache.clone()).invalidate_lists().await;
        assert!(!cache.exists(&count).await.unwrap());
    }
}
