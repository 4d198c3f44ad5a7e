//! Push message types and builders.

pub mod builder;
pub mod types;

pub use builder::NotificationBuilder;
pub use types::{InboundMessage, OutboundMessage};
