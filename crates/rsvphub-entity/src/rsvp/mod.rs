//! RSVP domain entities.

pub mod model;
pub mod status;

pub use model::{CreateRsvp, Rsvp};
pub use status::RsvpStatus;
