//! # rsvphub-core
//!
//! Core crate for RsvpHub. Contains configuration schemas, typed
//! identifiers, the broker message contract, pagination types, the
//! cache and broker traits, and the unified error system.
//!
//! This crate has **no** internal dependencies on other RsvpHub crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
