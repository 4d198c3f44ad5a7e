//! Redis-backed [`CacheProvider`](rsvphub_core::traits::CacheProvider).
//!
//! Keys are namespaced with `cache.redis.key_prefix`; pattern deletes walk
//! the keyspace with `SCAN`.

pub mod client;
pub mod operations;

pub use client::RedisClient;
pub use operations::RedisCacheProvider;
