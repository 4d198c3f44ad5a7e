//! # rsvphub-broker
//!
//! Durable topic-exchange messaging for RsvpHub:
//!
//! - **redis**: exchanges are Redis streams and queues are consumer groups
//! - **memory**: an in-process broker with the same delivery semantics,
//!   plus fault injection for tests
//!
//! [`EventPublisher`] is the write-side entry point; consumers use the
//! [`BrokerConnection`](rsvphub_core::traits::BrokerConnection) trait directly.

pub mod memory;
pub mod provider;
pub mod publisher;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use memory::MemoryBroker;
pub use provider::broker_from_config;
pub use publisher::EventPublisher;
