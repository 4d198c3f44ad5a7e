//! Request context carrying the authenticated user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rsvphub_core::types::id::UserId;
use rsvphub_entity::user::UserRole;

/// Context for the current authenticated request.
///
/// Built by the transport layer from verified token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// The authenticated user's ID.
    pub user_id: UserId,
    /// The user's role at the time the token was issued.
    pub role: UserRole,
    /// When the request was received.
    pub request_time: DateTime<Utc>,
}

impl RequestContext {
    /// Creates a new request context.
    pub fn new(user_id: UserId, role: UserRole) -> Self {
        Self {
            user_id,
            role,
            request_time: Utc::now(),
        }
    }

    /// Returns whether the current user may organize events.
    pub fn is_organizer_or_above(&self) -> bool {
        matches!(self.role, UserRole::Admin | UserRole::Organizer)
    }
}
