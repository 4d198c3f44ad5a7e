//! # rsvphub-auth
//!
//! Token handling for RsvpHub. Identity reaches the push-channel layer
//! already verified: this crate validates bearer tokens (signature, expiry,
//! token type, revocation) and can revoke them.
//!
//! ## Modules
//!
//! - `jwt`: claims, validation and the revocation blocklist
//!
//! Token minting (`JwtEncoder`) is compiled only under the `test-util`
//! feature; issuance belongs to the service that owns login.

pub mod jwt;

pub use jwt::{Claims, JwtDecoder, TokenType};
#[cfg(any(test, feature = "test-util"))]
pub use jwt::{JwtEncoder, TokenPair};
