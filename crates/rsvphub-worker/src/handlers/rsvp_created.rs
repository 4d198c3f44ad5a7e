//! `rsvp.created`: notify the event owner and confirm to the attendee.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use rsvphub_core::events::{DomainEvent, RSVP_CREATED};
use rsvphub_database::store::{EventStore, UserStore};
use rsvphub_realtime::{ConnectionRegistry, NotificationBuilder};

use crate::dispatcher::{HandlerError, MessageHandler};

/// Pushes live notifications for new RSVPs.
///
/// Redelivered messages push again; clients treat the messages as
/// informational, so duplicates are tolerated.
#[derive(Debug)]
pub struct RsvpCreatedHandler {
    events: Arc<dyn EventStore>,
    users: Arc<dyn UserStore>,
    registry: Arc<ConnectionRegistry>,
}

impl RsvpCreatedHandler {
    /// Create a new handler
    pub fn new(
        events: Arc<dyn EventStore>,
        users: Arc<dyn UserStore>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            events,
            users,
            registry,
        }
    }
}

#[async_trait]
impl MessageHandler for RsvpCreatedHandler {
    fn message_type(&self) -> &str {
        RSVP_CREATED
    }

    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError> {
        let DomainEvent::RsvpCreated(message) = serde_json::from_slice::<DomainEvent>(payload)
            .map_err(|e| HandlerError::Decode(e.to_string()))?
        else {
            return Err(HandlerError::Decode("expected an rsvp.created payload".to_string()));
        };

        let Some(event) = self.events.find_event(message.event_id).await? else {
            return Err(HandlerError::Skipped(format!(
                "event {} no longer exists",
                message.event_id
            )));
        };

        let attendee = self.users.find_user(message.user_id).await?;
        if attendee.is_none() {
            debug!(user_id = %message.user_id, "Attendee no longer exists, notifying owner without email");
        }
        let notification = NotificationBuilder::rsvp_created(&event, attendee.as_ref());
        let owner_pushes = self
            .registry
            .send_to_user(event.created_by, &notification)
            .await;

        let confirmation = NotificationBuilder::rsvp_confirmation(&event);
        let attendee_pushes = self
            .registry
            .send_to_user(message.user_id, &confirmation)
            .await;

        info!(
            rsvp_id = %message.rsvp_id,
            event_id = %event.id,
            owner_pushes,
            attendee_pushes,
            "Processed rsvp.created"
        );
        Ok(())
    }
}
