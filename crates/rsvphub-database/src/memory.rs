//! In-process implementation of every store trait.
//!
//! All tables live behind one async mutex, so each operation is atomic with
//! respect to every other. [`MemoryStore::create_within_capacity`] therefore
//! gives the same guarantee as the row lock taken by the PostgreSQL
//! repository.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use rsvphub_core::error::AppError;
use rsvphub_core::result::AppResult;
use rsvphub_core::types::id::{EventId, RsvpId, UserId};
use rsvphub_core::types::pagination::PageRequest;
use rsvphub_entity::event::{CreateEvent, Event, EventFilter, EventSummary};
use rsvphub_entity::rsvp::{CreateRsvp, Rsvp};
use rsvphub_entity::user::{CreateUser, User};

use crate::store::{
    DUPLICATE_RSVP_MESSAGE, EventStore, RsvpStore, UserStore, capacity_message,
};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    events: HashMap<EventId, Event>,
    rsvps: Vec<Rsvp>,
}

impl Tables {
    fn going_count(&self, event_id: EventId) -> i64 {
        self.rsvps
            .iter()
            .filter(|r| r.event_id == event_id && r.is_going())
            .count() as i64
    }

    fn summary(&self, event: &Event) -> EventSummary {
        EventSummary::new(event.clone(), self.going_count(event.id))
    }

    fn matching_events(&self, filter: &EventFilter) -> Vec<&Event> {
        let search = filter.normalized_search();
        let mut events: Vec<&Event> = self
            .events
            .values()
            .filter(|e| matches_filter(e, filter, search.as_deref()))
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        events
    }
}

fn matches_filter(event: &Event, filter: &EventFilter, search: Option<&str>) -> bool {
    if filter.created_by.is_some_and(|owner| owner != event.created_by) {
        return false;
    }
    if filter.category.is_some_and(|c| c != event.category) {
        return false;
    }
    if let Some(after) = filter.starts_after {
        if !event.starts_at.is_some_and(|s| s >= after) {
            return false;
        }
    }
    if let Some(before) = filter.starts_before {
        if !event.starts_at.is_some_and(|s| s <= before) {
            return false;
        }
    }
    match search {
        Some(terms) => {
            let text = format!(
                "{} {}",
                event.title,
                event.description.as_deref().unwrap_or_default()
            )
            .to_lowercase();
            terms.split(' ').all(|term| text.contains(term))
        }
        None => true,
    }
}

/// In-memory user, event and RSVP store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of RSVPs stored for an event, in any status.
    pub async fn rsvp_count(&self, event_id: EventId) -> usize {
        let tables = self.tables.lock().await;
        tables.rsvps.iter().filter(|r| r.event_id == event_id).count()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, id: UserId) -> AppResult<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create_user(&self, data: &CreateUser) -> AppResult<User> {
        let mut tables = self.tables.lock().await;
        if tables
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&data.email))
        {
            return Err(AppError::conflict("Email already registered"));
        }
        let user = User {
            id: UserId::new(),
            email: data.email.clone(),
            full_name: data.full_name.clone(),
            role: data.role,
            created_at: Utc::now(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn find_event(&self, id: EventId) -> AppResult<Option<Event>> {
        Ok(self.tables.lock().await.events.get(&id).cloned())
    }

    async fn find_event_summary(&self, id: EventId) -> AppResult<Option<EventSummary>> {
        let tables = self.tables.lock().await;
        Ok(tables.events.get(&id).map(|e| tables.summary(e)))
    }

    async fn create_event(&self, created_by: UserId, data: &CreateEvent) -> AppResult<Event> {
        let event = Event {
            id: EventId::new(),
            title: data.title.clone(),
            description: data.description.clone(),
            location: data.location.clone(),
            starts_at: data.starts_at,
            capacity: data.capacity,
            category: data.category,
            created_by,
            created_at: Utc::now(),
        };
        self.tables
            .lock()
            .await
            .events
            .insert(event.id, event.clone());
        Ok(event)
    }

    async fn list_events(
        &self,
        filter: &EventFilter,
        page: &PageRequest,
    ) -> AppResult<Vec<EventSummary>> {
        let tables = self.tables.lock().await;
        let skip = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.sql_limit()).unwrap_or(0);
        Ok(tables
            .matching_events(filter)
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|e| tables.summary(e))
            .collect())
    }

    async fn count_events(&self, filter: &EventFilter) -> AppResult<u64> {
        let tables = self.tables.lock().await;
        Ok(tables.matching_events(filter).len() as u64)
    }
}

#[async_trait]
impl RsvpStore for MemoryStore {
    async fn count_going(&self, event_id: EventId) -> AppResult<i64> {
        Ok(self.tables.lock().await.going_count(event_id))
    }

    async fn create_within_capacity(&self, data: &CreateRsvp) -> AppResult<Rsvp> {
        let mut tables = self.tables.lock().await;
        let capacity = tables
            .events
            .get(&data.event_id)
            .map(|e| e.capacity)
            .ok_or_else(|| AppError::not_found("Event not found"))?;

        if capacity > 0
            && data.status.counts_against_capacity()
            && tables.going_count(data.event_id) >= i64::from(capacity)
        {
            return Err(AppError::capacity_exceeded(capacity_message(capacity)));
        }
        if tables
            .rsvps
            .iter()
            .any(|r| r.user_id == data.user_id && r.event_id == data.event_id)
        {
            return Err(AppError::duplicate_rsvp(DUPLICATE_RSVP_MESSAGE));
        }

        let rsvp = Rsvp {
            id: RsvpId::new(),
            user_id: data.user_id,
            event_id: data.event_id,
            status: data.status,
            created_at: Utc::now(),
        };
        tables.rsvps.push(rsvp.clone());
        Ok(rsvp)
    }

    async fn find_rsvp(&self, user_id: UserId, event_id: EventId) -> AppResult<Option<Rsvp>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .rsvps
            .iter()
            .find(|r| r.user_id == user_id && r.event_id == event_id)
            .cloned())
    }

    async fn list_by_event(&self, event_id: EventId) -> AppResult<Vec<Rsvp>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .rsvps
            .iter()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn list_by_user(&self, user_id: UserId) -> AppResult<Vec<Rsvp>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .rsvps
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }
}
