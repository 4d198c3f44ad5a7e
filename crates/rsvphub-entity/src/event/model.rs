//! Event entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use rsvphub_core::types::id::{EventId, UserId};

use super::category::EventCategory;

/// An event that users can RSVP to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Event {
    /// Unique event identifier.
    pub id: EventId,
    /// Event title.
    pub title: String,
    /// Free-text description.
    pub description: Option<String>,
    /// Venue or address.
    pub location: Option<String>,
    /// Scheduled start time.
    pub starts_at: Option<DateTime<Utc>>,
    /// Maximum "going" RSVPs; 0 means unlimited.
    pub capacity: i32,
    /// Event category.
    pub category: EventCategory,
    /// The organizer who owns the event.
    pub created_by: UserId,
    /// When the event was created.
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Whether a positive capacity bounds the "going" RSVPs.
    pub fn has_capacity_limit(&self) -> bool {
        self.capacity > 0
    }
}

/// Data required to create a new event.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateEvent {
    /// Event title.
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,
    /// Free-text description.
    pub description: Option<String>,
    /// Venue or address.
    #[validate(length(max = 255, message = "Location must be at most 255 characters"))]
    pub location: Option<String>,
    /// Scheduled start time.
    pub starts_at: Option<DateTime<Utc>>,
    /// Maximum "going" RSVPs; 0 means unlimited.
    #[validate(range(min = 0, message = "Capacity must not be negative"))]
    #[serde(default)]
    pub capacity: i32,
    /// Event category.
    #[serde(default)]
    pub category: EventCategory,
}

/// An event together with its live attendance numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    /// The event row.
    #[serde(flatten)]
    pub event: Event,
    /// Current number of "going" RSVPs.
    pub going_count: i64,
    /// Remaining "going" slots; `None` when capacity is unlimited.
    pub available_spots: Option<i64>,
}

impl EventSummary {
    /// Build a summary from an event and its current going count.
    pub fn new(event: Event, going_count: i64) -> Self {
        let available_spots = event
            .has_capacity_limit()
            .then(|| (i64::from(event.capacity) - going_count).max(0));
        Self {
            event,
            going_count,
            available_spots,
        }
    }
}

/// Filters for listing events. All fields are optional and combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Only events owned by this organizer.
    pub created_by: Option<UserId>,
    /// Only events starting at or after this time.
    pub starts_after: Option<DateTime<Utc>>,
    /// Only events starting at or before this time.
    pub starts_before: Option<DateTime<Utc>>,
    /// Only events in this category.
    pub category: Option<EventCategory>,
    /// Full-text search over title and description.
    pub search: Option<String>,
}

impl EventFilter {
    /// The search text trimmed, lowercased and whitespace-collapsed, if any.
    pub fn normalized_search(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase())
            .filter(|s| !s.is_empty())
    }
}
