//! # rsvphub-cache
//!
//! Cache provider implementations for RsvpHub. Supports two modes:
//!
//! - **memory**: In-process cache using [moka](https://crates.io/crates/moka)
//! - **redis**: Redis-backed cache using the [redis](https://crates.io/crates/redis) crate
//!
//! The provider is selected at runtime based on configuration. Keys are
//! built only through [`keys`], and write paths evict stale entries through
//! [`CacheInvalidator`].

pub mod glob;
pub mod invalidator;
pub mod keys;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use invalidator::CacheInvalidator;
pub use provider::CacheManager;
