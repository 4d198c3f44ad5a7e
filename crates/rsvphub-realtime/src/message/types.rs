//! Inbound and outbound push message type definitions.

use serde::{Deserialize, Serialize};

use rsvphub_core::types::id::EventId;

/// Messages sent by the client to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Keepalive; answered with [`OutboundMessage::Pong`].
    Ping,
}

/// Messages sent by the server to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    /// Someone RSVP'd to an event the recipient owns.
    #[serde(rename = "rsvp.created")]
    RsvpCreated {
        /// The event RSVP'd to.
        event_id: EventId,
        /// Title of that event.
        event_title: String,
        /// Email of the attendee; `null` once the account is gone.
        user_email: Option<String>,
    },
    /// The recipient's own RSVP was recorded.
    #[serde(rename = "rsvp.confirmation")]
    RsvpConfirmation {
        /// The event RSVP'd to.
        event_id: EventId,
        /// Title of that event.
        event: String,
    },
    /// Reply to a client ping.
    #[serde(rename = "pong")]
    Pong,
    /// The client sent something the server could not handle.
    #[serde(rename = "error")]
    Error {
        /// Error code.
        code: String,
        /// Error description.
        message: String,
    },
}

impl OutboundMessage {
    /// Serialize to the JSON text frame sent over the socket.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
