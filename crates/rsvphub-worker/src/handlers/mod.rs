//! Message handlers registered with the dispatcher.

pub mod rsvp_created;

pub use rsvp_created::RsvpCreatedHandler;
