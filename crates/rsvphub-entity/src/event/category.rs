//! Event category enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Topical category of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_category", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Technology,
    Business,
    Arts,
    Sports,
    Education,
    Social,
    Health,
    Music,
    Food,
    Other,
}

impl EventCategory {
    /// All categories, in declaration order.
    pub const ALL: [EventCategory; 10] = [
        Self::Technology,
        Self::Business,
        Self::Arts,
        Self::Sports,
        Self::Education,
        Self::Social,
        Self::Health,
        Self::Music,
        Self::Food,
        Self::Other,
    ];

    /// Return the category as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Technology => "technology",
            Self::Business => "business",
            Self::Arts => "arts",
            Self::Sports => "sports",
            Self::Education => "education",
            Self::Social => "social",
            Self::Health => "health",
            Self::Music => "music",
            Self::Food => "food",
            Self::Other => "other",
        }
    }
}

impl Default for EventCategory {
    fn default() -> Self {
        Self::Other
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventCategory {
    type Err = rsvphub_core::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == lowered)
            .ok_or_else(|| {
                rsvphub_core::AppError::validation(format!("Invalid event category: '{s}'"))
            })
    }
}
