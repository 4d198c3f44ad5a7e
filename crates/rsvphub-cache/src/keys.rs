//! Cache key builders for every RsvpHub cache entry.
//!
//! Keys are versioned by [`SCHEMA_VERSION`]. List and count keys encode
//! their filter field by field in a fixed order; equal queries share one key.

use chrono::{DateTime, SecondsFormat, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use rsvphub_core::types::id::EventId;
use rsvphub_core::types::pagination::PageRequest;
use rsvphub_entity::event::EventFilter;

/// Prefix applied to all RsvpHub data cache keys.
const PREFIX: &str = "rsvphub";

/// Version of the key layout and cached value shapes.
pub const SCHEMA_VERSION: &str = "v1";

/// Bytes escaped inside a key component: everything but ASCII
/// alphanumerics, `-`, `.` and `_`. Covers key separators and glob syntax.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_');

// ── Event keys ─────────────────────────────────────────────

/// Cache key for an event summary by ID.
pub fn event_detail(event_id: EventId) -> String {
    format!("{PREFIX}:{SCHEMA_VERSION}:events:detail:{event_id}")
}

/// Cache key for one page of an event listing.
pub fn event_list(filter: &EventFilter, page: &PageRequest) -> String {
    let page = page.normalized();
    format!(
        "{PREFIX}:{SCHEMA_VERSION}:events:list:{}|skip={}|limit={}",
        canonical_filter(filter),
        page.skip,
        page.limit
    )
}

/// Cache key for the total matching an event listing filter.
pub fn event_count(filter: &EventFilter) -> String {
    format!(
        "{PREFIX}:{SCHEMA_VERSION}:events:count:{}",
        canonical_filter(filter)
    )
}

/// Pattern matching every cached event listing page.
pub fn event_list_pattern() -> String {
    format!("{PREFIX}:{SCHEMA_VERSION}:events:list:*")
}

/// Pattern matching every cached event listing total.
pub fn event_count_pattern() -> String {
    format!("{PREFIX}:{SCHEMA_VERSION}:events:count:*")
}

// ── Auth keys ──────────────────────────────────────────────

/// Cache key marking a token ID as revoked.
pub fn revoked_token(jti: &str) -> String {
    format!("auth:{SCHEMA_VERSION}:revoked:{jti}")
}

// ── Encoding ───────────────────────────────────────────────

/// Encode a filter as `owner=..|after=..|before=..|cat=..|q=..`, `-` for unset.
pub fn canonical_filter(filter: &EventFilter) -> String {
    format!(
        "owner={}|after={}|before={}|cat={}|q={}",
        filter
            .created_by
            .map_or_else(|| "-".to_string(), |id| id.to_string()),
        encode_time(filter.starts_after),
        encode_time(filter.starts_before),
        filter.category.map_or("-", |c| c.as_str()),
        filter
            .normalized_search()
            .map_or_else(|| "-".to_string(), |q| escape_component(&q)),
    )
}

fn encode_time(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(
        || "-".to_string(),
        |t| t.to_rfc3339_opts(SecondsFormat::Micros, true),
    )
}

fn escape_component(raw: &str) -> String {
    utf8_percent_encode(raw, COMPONENT).to_string()
}
