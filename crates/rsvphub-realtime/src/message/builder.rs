//! Builders turning domain rows into push messages.

use rsvphub_entity::event::Event;
use rsvphub_entity::user::User;

use super::types::OutboundMessage;

/// Builds the messages pushed when an RSVP is created.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationBuilder;

impl NotificationBuilder {
    /// Message for the event owner. `attendee` is `None` when the
    /// account was deleted after the RSVP was published.
    pub fn rsvp_created(event: &Event, attendee: Option<&User>) -> OutboundMessage {
        OutboundMessage::RsvpCreated {
            event_id: event.id,
            event_title: event.title.clone(),
            user_email: attendee.map(|u| u.email.clone()),
        }
    }

    /// Confirmation for the attendee.
    pub fn rsvp_confirmation(event: &Event) -> OutboundMessage {
        OutboundMessage::RsvpConfirmation {
            event_id: event.id,
            event: event.title.clone(),
        }
    }
}
