//! Store traits the service layer is written against.
//!
//! Each trait has a PostgreSQL implementation in [`crate::repositories`]
//! and, with the `memory` feature, an in-process one in `crate::memory`.

use std::fmt::Debug;

use async_trait::async_trait;

use rsvphub_core::result::AppResult;
use rsvphub_core::types::id::{EventId, UserId};
use rsvphub_core::types::pagination::PageRequest;
use rsvphub_entity::event::{CreateEvent, Event, EventFilter, EventSummary};
use rsvphub_entity::rsvp::{CreateRsvp, Rsvp};
use rsvphub_entity::user::{CreateUser, User};

/// User lookups.
#[async_trait]
pub trait UserStore: Send + Sync + Debug + 'static {
    /// Find a user by primary key.
    async fn find_user(&self, id: UserId) -> AppResult<Option<User>>;

    /// Find a user by email (case-insensitive).
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;

    /// Insert a user. Fails with `Conflict` when the email is taken.
    async fn create_user(&self, data: &CreateUser) -> AppResult<User>;
}

/// Event persistence and queries.
#[async_trait]
pub trait EventStore: Send + Sync + Debug + 'static {
    /// Find an event by primary key.
    async fn find_event(&self, id: EventId) -> AppResult<Option<Event>>;

    /// Find an event together with its current going count.
    async fn find_event_summary(&self, id: EventId) -> AppResult<Option<EventSummary>>;

    /// Insert an event owned by `created_by`.
    async fn create_event(&self, created_by: UserId, data: &CreateEvent) -> AppResult<Event>;

    /// List events matching `filter`, newest first.
    async fn list_events(
        &self,
        filter: &EventFilter,
        page: &PageRequest,
    ) -> AppResult<Vec<EventSummary>>;

    /// Count events matching `filter`.
    async fn count_events(&self, filter: &EventFilter) -> AppResult<u64>;
}

/// RSVP persistence. Also the capacity store: counts of "going" RSVPs.
#[async_trait]
pub trait RsvpStore: Send + Sync + Debug + 'static {
    /// Number of RSVPs with status "going" for an event.
    async fn count_going(&self, event_id: EventId) -> AppResult<i64>;

    /// Insert an RSVP while holding the event's capacity exclusively.
    ///
    /// The going count is re-read and compared to the event capacity in the
    /// same critical section as the insert, so concurrent writers for one
    /// event cannot overrun it. Fails with `NotFound` when the event does
    /// not exist, `CapacityExceeded` when a "going" RSVP would overrun a
    /// positive capacity, and `DuplicateRsvp` when the (user, event) pair
    /// already holds an RSVP.
    async fn create_within_capacity(&self, data: &CreateRsvp) -> AppResult<Rsvp>;

    /// The RSVP a user holds for an event, if any.
    async fn find_rsvp(&self, user_id: UserId, event_id: EventId) -> AppResult<Option<Rsvp>>;

    /// All RSVPs for an event, oldest first.
    async fn list_by_event(&self, event_id: EventId) -> AppResult<Vec<Rsvp>>;

    /// All RSVPs held by a user, newest first.
    async fn list_by_user(&self, user_id: UserId) -> AppResult<Vec<Rsvp>>;
}

/// Message used for every capacity rejection.
pub fn capacity_message(capacity: i32) -> String {
    format!("Event is at full capacity ({capacity} attendees)")
}

/// Message used for every duplicate RSVP rejection.
pub const DUPLICATE_RSVP_MESSAGE: &str =
    "You have already RSVP'd to this event. Please update your existing RSVP instead.";
