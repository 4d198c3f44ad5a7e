//! RSVP entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use rsvphub_core::types::id::{EventId, RsvpId, UserId};

use super::status::RsvpStatus;

/// A user's RSVP to an event. At most one exists per (user, event) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Rsvp {
    pub id: RsvpId,
    pub user_id: UserId,
    pub event_id: EventId,
    pub status: RsvpStatus,
    pub created_at: DateTime<Utc>,
}

impl Rsvp {
    /// Whether this RSVP occupies a capacity slot.
    pub fn is_going(&self) -> bool {
        self.status.counts_against_capacity()
    }
}

/// Data required to create an RSVP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRsvp {
    pub event_id: EventId,
    pub user_id: UserId,
    #[serde(default)]
    pub status: RsvpStatus,
}

impl CreateRsvp {
    /// Build an RSVP request for `user_id` on `event_id`.
    pub fn new(event_id: EventId, user_id: UserId, status: RsvpStatus) -> Self {
        Self {
            event_id,
            user_id,
            status,
        }
    }
}
