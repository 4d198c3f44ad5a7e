//! Message dispatcher: routes broker payloads to registered handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use rsvphub_core::error::AppError;
use rsvphub_core::events::peek_type;

/// Trait for message handler implementations
#[async_trait]
pub trait MessageHandler: Send + Sync + std::fmt::Debug {
    /// The `type` tag this handler processes
    fn message_type(&self) -> &str;

    /// Handle one JSON payload
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError>;
}

/// Error from message handling. The consumer acknowledges regardless.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The payload could not be decoded
    #[error("Undecodable message: {0}")]
    Decode(String),

    /// Nothing to do for this message
    #[error("Skipped: {0}")]
    Skipped(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] AppError),
}

/// Dispatches messages to the appropriate handler based on their type tag
#[derive(Debug, Default)]
pub struct MessageDispatcher {
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
}

impl MessageDispatcher {
    /// Create a dispatcher with no handlers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same tag
    pub fn register(&mut self, handler: Arc<dyn MessageHandler>) {
        let message_type = handler.message_type().to_string();
        tracing::info!(message_type = %message_type, "Registered message handler");
        self.handlers.insert(message_type, handler);
    }

    /// Decode the type tag and run the matching handler
    pub async fn dispatch(&self, payload: &[u8]) -> Result<(), HandlerError> {
        let message_type = peek_type(payload)
            .map_err(|e| HandlerError::Decode(e.message))?
            .ok_or_else(|| HandlerError::Decode("missing type tag".to_string()))?;

        let handler = self.handlers.get(&message_type).ok_or_else(|| {
            HandlerError::Skipped(format!("no handler for message type '{message_type}'"))
        })?;

        handler.handle(payload).await
    }

    /// Check if a handler is registered for a type tag
    pub fn has_handler(&self, message_type: &str) -> bool {
        self.handlers.contains_key(message_type)
    }
}
