//! RSVP creation and listing.

pub mod service;

pub use service::RsvpService;
