//! Push channels and the connection registry.

pub mod channel;
pub mod handle;
pub mod registry;

pub use channel::{ConnectionId, PushChannel, PushError};
pub use handle::ConnectionHandle;
pub use registry::ConnectionRegistry;
