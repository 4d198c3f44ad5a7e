//! Redis Streams broker.
//!
//! An exchange is one stream (`{prefix}{exchange}`) whose entries carry
//! `routing_key`, `content_type` and `payload` fields. A queue is a consumer
//! group on that stream, so it survives restarts and tracks unacknowledged
//! entries per consumer. Binding patterns are recorded in the hash
//! `{prefix}{exchange}:bindings` and applied when entries are fetched.

pub mod connection;

pub use connection::{RedisStreamsBroker, RedisStreamsConnection};
