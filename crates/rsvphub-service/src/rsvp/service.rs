//! RSVP writer: capacity pre-check, constrained insert, then best-effort
//! cache eviction and `rsvp.created` publication.

use std::sync::Arc;

use tracing::{info, warn};

use rsvphub_broker::EventPublisher;
use rsvphub_cache::CacheInvalidator;
use rsvphub_core::error::AppError;
use rsvphub_core::events::{DomainEvent, RsvpCreated};
use rsvphub_core::result::AppResult;
use rsvphub_core::types::id::{EventId, UserId};
use rsvphub_database::store::{EventStore, RsvpStore, capacity_message};
use rsvphub_entity::rsvp::{CreateRsvp, Rsvp, RsvpStatus};

/// Creates and lists RSVPs.
#[derive(Debug, Clone)]
pub struct RsvpService {
    /// Event lookups.
    events: Arc<dyn EventStore>,
    /// RSVP persistence and going counts.
    rsvps: Arc<dyn RsvpStore>,
    /// Evicts cached event reads after a write.
    invalidator: CacheInvalidator,
    /// Emits `rsvp.created`.
    publisher: Arc<EventPublisher>,
}

impl RsvpService {
    /// Creates a new RSVP service.
    pub fn new(
        events: Arc<dyn EventStore>,
        rsvps: Arc<dyn RsvpStore>,
        invalidator: CacheInvalidator,
        publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            events,
            rsvps,
            invalidator,
            publisher,
        }
    }

    /// Records `user_id`'s RSVP to `event_id`.
    ///
    /// Fails with `NotFound` for an unknown event, `CapacityExceeded` when a
    /// "going" RSVP would overrun a positive capacity and `DuplicateRsvp`
    /// when the user already responded. Once the row is committed, cache
    /// eviction and publication are attempted and their failures only logged.
    pub async fn create_rsvp(
        &self,
        user_id: UserId,
        event_id: EventId,
        status: RsvpStatus,
    ) -> AppResult<Rsvp> {
        let event = self
            .events
            .find_event(event_id)
            .await?
            .ok_or_else(|| AppError::not_found("Event not found"))?;

        // Fast rejection; the store re-checks under the event lock.
        if event.has_capacity_limit() && status.counts_against_capacity() {
            let going = self.rsvps.count_going(event_id).await?;
            if going >= i64::from(event.capacity) {
                return Err(AppError::capacity_exceeded(capacity_message(event.capacity)));
            }
        }

        let rsvp = self
            .rsvps
            .create_within_capacity(&CreateRsvp::new(event_id, user_id, status))
            .await?;

        info!(
            rsvp_id = %rsvp.id,
            event_id = %event_id,
            user_id = %user_id,
            status = %rsvp.status,
            "RSVP created"
        );

        self.invalidator.invalidate(event_id).await;

        let message = DomainEvent::from(RsvpCreated {
            rsvp_id: rsvp.id,
            user_id,
            event_id,
        });
        if let Err(e) = self.publisher.publish_event(&message).await {
            warn!(
                rsvp_id = %rsvp.id,
                event_id = %event_id,
                error = %e,
                "Failed to publish rsvp.created, notification lost"
            );
        }

        Ok(rsvp)
    }

    /// Current number of "going" RSVPs for an event.
    pub async fn current_going_count(&self, event_id: EventId) -> AppResult<i64> {
        self.rsvps.count_going(event_id).await
    }

    /// RSVPs for an event, oldest first.
    pub async fn list_event_rsvps(&self, event_id: EventId) -> AppResult<Vec<Rsvp>> {
        if self.events.find_event(event_id).await?.is_none() {
            return Err(AppError::not_found("Event not found"));
        }
        self.rsvps.list_by_event(event_id).await
    }

    /// RSVPs held by a user, newest first.
    pub async fn list_user_rsvps(&self, user_id: UserId) -> AppResult<Vec<Rsvp>> {
        self.rsvps.list_by_user(user_id).await
    }
}
