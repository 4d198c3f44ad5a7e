//! Event creation and cache-aside reads.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use validator::Validate;

use rsvphub_broker::EventPublisher;
use rsvphub_cache::{CacheInvalidator, CacheManager, keys};
use rsvphub_core::error::AppError;
use rsvphub_core::events::{DomainEvent, EventCreated};
use rsvphub_core::result::AppResult;
use rsvphub_core::traits::CacheProvider;
use rsvphub_core::types::id::EventId;
use rsvphub_core::types::pagination::{PageRequest, PageResponse};
use rsvphub_database::store::EventStore;
use rsvphub_entity::event::{CreateEvent, Event, EventFilter, EventSummary};

use crate::context::RequestContext;

/// Creates events and serves cached event reads.
#[derive(Debug, Clone)]
pub struct EventService {
    /// Event persistence.
    events: Arc<dyn EventStore>,
    /// Read-through cache for details, pages and totals.
    cache: Arc<CacheManager>,
    /// Evicts list pages after a new event.
    invalidator: CacheInvalidator,
    /// Emits `event.created`.
    publisher: Arc<EventPublisher>,
}

impl EventService {
    /// Creates a new event service.
    pub fn new(
        events: Arc<dyn EventStore>,
        cache: Arc<CacheManager>,
        publisher: Arc<EventPublisher>,
    ) -> Self {
        let invalidator = CacheInvalidator::new(cache.clone());
        Self {
            events,
            cache,
            invalidator,
            publisher,
        }
    }

    /// Creates an event owned by the acting organizer.
    pub async fn create_event(
        &self,
        ctx: &RequestContext,
        req: CreateEvent,
    ) -> AppResult<Event> {
        if !ctx.is_organizer_or_above() {
            return Err(AppError::authorization("Only organizers can create events"));
        }
        req.validate()
            .map_err(|e| AppError::validation(format!("Invalid event: {e}")))?;

        let event = self.events.create_event(ctx.user_id, &req).await?;
        info!(event_id = %event.id, created_by = %ctx.user_id, "Event created");

        self.invalidator.invalidate_lists().await;

        let message = DomainEvent::from(EventCreated {
            event_id: event.id,
            created_by: ctx.user_id,
        });
        if let Err(e) = self.publisher.publish_event(&message).await {
            warn!(event_id = %event.id, error = %e, "Failed to publish event.created");
        }

        Ok(event)
    }

    /// Gets an event with its attendance numbers.
    pub async fn get_event(&self, event_id: EventId) -> AppResult<EventSummary> {
        let key = keys::event_detail(event_id);
        if let Some(summary) = self.cached(&key).await {
            return Ok(summary);
        }

        let summary = self
            .events
            .find_event_summary(event_id)
            .await?
            .ok_or_else(|| AppError::not_found("Event not found"))?;

        self.store(&key, &summary).await;
        Ok(summary)
    }

    /// Lists events matching `filter`, newest first.
    pub async fn list_events(
        &self,
        filter: &EventFilter,
        page: PageRequest,
    ) -> AppResult<PageResponse<EventSummary>> {
        let page = page.normalized();
        let filter = EventFilter {
            search: filter.normalized_search(),
            ..filter.clone()
        };

        let list_key = keys::event_list(&filter, &page);
        if let Some(response) = self.cached(&list_key).await {
            return Ok(response);
        }

        let items = self.events.list_events(&filter, &page).await?;
        let total = self.count_events(&filter).await?;
        let response = PageResponse::new(items, &page, total);

        self.store(&list_key, &response).await;
        Ok(response)
    }

    async fn count_events(&self, filter: &EventFilter) -> AppResult<u64> {
        let key = keys::event_count(filter);
        if let Some(total) = self.cached(&key).await {
            return Ok(total);
        }
        let total = self.events.count_events(filter).await?;
        self.store(&key, &total).await;
        Ok(total)
    }

    /// Cache read; misses and cache failures both fall through to the store.
    async fn cached<T: DeserializeOwned + Send>(&self, key: &str) -> Option<T> {
        match self.cache.get_json::<T>(key).await {
            Ok(Some(value)) => {
                debug!(key, "Cache hit");
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed");
                None
            }
        }
    }

    async fn store<T: Serialize + Send + Sync>(&self, key: &str, value: &T) {
        if let Err(e) = self
            .cache
            .set_json(key, value, self.cache.default_ttl())
            .await
        {
            warn!(key, error = %e, "Cache write failed");
        }
    }
}
