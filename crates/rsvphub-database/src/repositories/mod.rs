//! PostgreSQL repository implementations of the store traits.

pub mod event;
pub mod rsvp;
pub mod user;

pub use event::EventRepository;
pub use rsvp::RsvpRepository;
pub use user::UserRepository;
