//! Core traits defined in `rsvphub-core` and implemented by other crates.

pub mod broker;
pub mod cache;

pub use broker::{BrokerConnection, Delivery, MessageBroker, QueueBinding};
pub use cache::CacheProvider;
