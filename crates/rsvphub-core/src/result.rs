//! Convenience result type alias for RsvpHub.

use crate::error::AppError;

/// A specialized `Result` type for RsvpHub operations.
pub type AppResult<T> = Result<T, AppError>;
