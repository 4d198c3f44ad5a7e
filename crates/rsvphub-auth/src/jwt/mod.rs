//! JWT token encoding, decoding, and claims management.

pub mod claims;
pub mod decoder;
#[cfg(any(test, feature = "test-util"))]
pub mod encoder;

pub use claims::{Claims, TokenType};
pub use decoder::JwtDecoder;
#[cfg(any(test, feature = "test-util"))]
pub use encoder::{JwtEncoder, TokenPair};
