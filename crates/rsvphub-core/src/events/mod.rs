//! Domain events published to the broker.
//!
//! Every message carries a `type` tag that doubles as its routing key
//! on the topic exchange. Consumers dispatch on the tag and must
//! tolerate duplicates (delivery is at-least-once).

pub mod routing;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::types::id::{EventId, RsvpId, UserId};

pub use routing::{is_valid_routing_key, routing_key_matches};

/// Routing key and type tag of [`RsvpCreated`].
pub const RSVP_CREATED: &str = "rsvp.created";
/// Routing key and type tag of [`EventCreated`].
pub const EVENT_CREATED: &str = "event.created";

/// Union of all events emitted onto the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    /// An RSVP row was committed.
    #[serde(rename = "rsvp.created")]
    RsvpCreated(RsvpCreated),
    /// An event was created by an organizer.
    #[serde(rename = "event.created")]
    EventCreated(EventCreated),
}

/// Payload of `rsvp.created`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsvpCreated {
    /// The new RSVP.
    pub rsvp_id: RsvpId,
    /// The user who RSVP'd.
    pub user_id: UserId,
    /// The event RSVP'd to.
    pub event_id: EventId,
}

/// Payload of `event.created`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCreated {
    /// The new event.
    pub event_id: EventId,
    /// The organizer who created it.
    pub created_by: UserId,
}

impl DomainEvent {
    /// The hierarchical routing key for this event.
    pub fn routing_key(&self) -> &'static str {
        match self {
            Self::RsvpCreated(_) => RSVP_CREATED,
            Self::EventCreated(_) => EVENT_CREATED,
        }
    }

    /// Serialize to the JSON wire format.
    pub fn to_payload(&self) -> Result<Vec<u8>, AppError> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl From<RsvpCreated> for DomainEvent {
    fn from(event: RsvpCreated) -> Self {
        Self::RsvpCreated(event)
    }
}

impl From<EventCreated> for DomainEvent {
    fn from(event: EventCreated) -> Self {
        Self::EventCreated(event)
    }
}

/// Read the `type` tag of a JSON payload without decoding the body.
///
/// Returns `Ok(None)` for a valid JSON object without a string tag.
pub fn peek_type(payload: &[u8]) -> Result<Option<String>, AppError> {
    let value: serde_json::Value = serde_json::from_slice(payload)?;
    Ok(value
        .get("type")
        .and_then(|t| t.as_str())
        .map(str::to_string))
}
