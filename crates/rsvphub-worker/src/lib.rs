//! Background notification processing for RsvpHub.
//!
//! This crate provides:
//! - A consumer that reads the durable notification queue with bounded
//!   reconnects and publishes its lifecycle state
//! - A dispatcher that routes each message to the handler for its type tag
//! - The `rsvp.created` handler pushing live notifications
//! - A supervisor owning the consumer task (start, health, shutdown)

pub mod consumer;
pub mod dispatcher;
pub mod handlers;
pub mod supervisor;

pub use consumer::{ConsumerState, ConsumerStats, NotificationConsumer};
pub use dispatcher::{HandlerError, MessageDispatcher, MessageHandler};
pub use handlers::RsvpCreatedHandler;
pub use supervisor::{ConsumerHealth, ConsumerSupervisor};
