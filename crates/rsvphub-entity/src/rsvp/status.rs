//! RSVP status enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A user's answer to an event invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "rsvp_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RsvpStatus {
    /// The user will attend. Counts against capacity.
    #[default]
    Going,
    /// The user might attend.
    Interested,
    /// The user withdrew.
    Cancelled,
}

impl RsvpStatus {
    /// Whether an RSVP in this status occupies a capacity slot.
    pub fn counts_against_capacity(&self) -> bool {
        matches!(self, Self::Going)
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Going => "going",
            Self::Interested => "interested",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RsvpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RsvpStatus {
    type Err = rsvphub_core::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "going" => Ok(Self::Going),
            "interested" => Ok(Self::Interested),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(rsvphub_core::AppError::validation(format!(
                "Invalid RSVP status: '{s}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_going_counts() {
        assert!(RsvpStatus::Going.counts_against_capacity());
        assert!(!RsvpStatus::Interested.counts_against_capacity());
        assert!(!RsvpStatus::Cancelled.counts_against_capacity());
    }

    #[test]
    fn test_default_is_going() {
        assert_eq!(RsvpStatus::default(), RsvpStatus::Going);
        let status: RsvpStatus = serde_json::from_str("\"interested\"").unwrap();
        assert_eq!(status, RsvpStatus::Interested);
    }
}
