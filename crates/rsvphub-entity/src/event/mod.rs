//! Event domain entities.

pub mod category;
pub mod model;

pub use category::EventCategory;
pub use model::{CreateEvent, Event, EventFilter, EventSummary};
