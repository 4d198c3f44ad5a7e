//! Event creation and cached reads.

pub mod service;

pub use service::EventService;
