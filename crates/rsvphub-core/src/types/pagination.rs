//! Offset pagination types for list queries.

use serde::{Deserialize, Serialize};

/// Default page size.
const DEFAULT_LIMIT: u64 = 20;
/// Maximum page size.
const MAX_LIMIT: u64 = 100;

/// Request parameters for paginated queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Number of items to skip.
    #[serde(default)]
    pub skip: u64,
    /// Maximum number of items to return (1..=100).
    #[serde(default = "default_limit")]
    pub limit: u64,
}

impl PageRequest {
    /// Create a new page request, clamping the limit into range.
    pub fn new(skip: u64, limit: u64) -> Self {
        Self {
            skip,
            limit: limit.clamp(1, MAX_LIMIT),
        }
    }

    /// Return a copy with the limit clamped into range.
    pub fn normalized(self) -> Self {
        Self::new(self.skip, self.limit)
    }

    /// Calculate the SQL `OFFSET` value.
    pub fn offset(&self) -> i64 {
        i64::try_from(self.skip).unwrap_or(i64::MAX)
    }

    /// Return the SQL `LIMIT` value.
    pub fn sql_limit(&self) -> i64 {
        i64::try_from(self.limit.clamp(1, MAX_LIMIT)).unwrap_or(DEFAULT_LIMIT as i64)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Paginated response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResponse<T> {
    /// The items on this page.
    pub items: Vec<T>,
    /// Total number of items matching the query.
    pub total: u64,
    /// Items skipped before this page.
    pub skip: u64,
    /// Page size used.
    pub limit: u64,
    /// Whether more items follow this page.
    pub has_more: bool,
}

impl<T> PageResponse<T> {
    /// Create a new paginated response.
    pub fn new(items: Vec<T>, page: &PageRequest, total: u64) -> Self {
        let has_more = page.skip + (items.len() as u64) < total;
        Self {
            items,
            total,
            skip: page.skip,
            limit: page.limit,
            has_more,
        }
    }
}

fn default_limit() -> u64 {
    DEFAULT_LIMIT
}
