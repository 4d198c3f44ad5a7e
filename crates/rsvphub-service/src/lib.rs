//! # rsvphub-service
//!
//! Business logic service layer for RsvpHub. Each service orchestrates
//! the stores, the cache and the event publisher to implement one
//! application-level use case.
//!
//! Services take all of their dependencies at construction time as `Arc`
//! references.

pub mod context;
pub mod event;
pub mod rsvp;

pub use context::RequestContext;
pub use event::EventService;
pub use rsvp::RsvpService;
