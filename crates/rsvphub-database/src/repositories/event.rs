//! Event repository implementation.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use rsvphub_core::error::{AppError, ErrorKind};
use rsvphub_core::result::AppResult;
use rsvphub_core::types::id::{EventId, UserId};
use rsvphub_core::types::pagination::PageRequest;
use rsvphub_entity::event::{CreateEvent, Event, EventFilter, EventSummary};

use crate::store::EventStore;

const EVENT_COLUMNS: &str = "e.id, e.title, e.description, e.location, e.starts_at, \
     e.capacity, e.category, e.created_by, e.created_at";

const GOING_COUNT: &str = "(SELECT COUNT(*) FROM rsvps r \
     WHERE r.event_id = e.id AND r.status = 'going') AS going_count";

/// Every filter is optional; a NULL parameter disables its predicate.
const FILTER_CLAUSE: &str = "WHERE ($1::uuid IS NULL OR e.created_by = $1) \
     AND ($2::timestamptz IS NULL OR e.starts_at >= $2) \
     AND ($3::timestamptz IS NULL OR e.starts_at <= $3) \
     AND ($4::event_category IS NULL OR e.category = $4) \
     AND ($5::text IS NULL OR to_tsvector('english', \
          COALESCE(e.title, '') || ' ' || COALESCE(e.description, '')) \
          @@ plainto_tsquery('english', $5))";

#[derive(Debug, FromRow)]
struct EventSummaryRow {
    #[sqlx(flatten)]
    event: Event,
    going_count: i64,
}

impl From<EventSummaryRow> for EventSummary {
    fn from(row: EventSummaryRow) -> Self {
        EventSummary::new(row.event, row.going_count)
    }
}

/// Repository for events and their attendance summaries.
#[derive(Debug, Clone)]
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    /// Create a new event repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for EventRepository {
    async fn find_event(&self, id: EventId) -> AppResult<Option<Event>> {
        sqlx::query_as::<_, Event>(&format!("SELECT {EVENT_COLUMNS} FROM events e WHERE e.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find event", e))
    }

    async fn find_event_summary(&self, id: EventId) -> AppResult<Option<EventSummary>> {
        let row = sqlx::query_as::<_, EventSummaryRow>(&format!(
            "SELECT {EVENT_COLUMNS}, {GOING_COUNT} FROM events e WHERE e.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to find event summary", e)
        })?;
        Ok(row.map(EventSummary::from))
    }

    async fn create_event(&self, created_by: UserId, data: &CreateEvent) -> AppResult<Event> {
        sqlx::query_as::<_, Event>(
            "INSERT INTO events \
             (id, title, description, location, starts_at, capacity, category, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING id, title, description, location, starts_at, capacity, category, \
             created_by, created_at",
        )
        .bind(EventId::new())
        .bind(&data.title)
        .bind(&data.description)
        .bind(&data.location)
        .bind(data.starts_at)
        .bind(data.capacity)
        .bind(data.category)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create event", e))
    }

    async fn list_events(
        &self,
        filter: &EventFilter,
        page: &PageRequest,
    ) -> AppResult<Vec<EventSummary>> {
        let rows = sqlx::query_as::<_, EventSummaryRow>(&format!(
            "SELECT {EVENT_COLUMNS}, {GOING_COUNT} FROM events e {FILTER_CLAUSE} \
             ORDER BY e.created_at DESC LIMIT $6 OFFSET $7"
        ))
        .bind(filter.created_by)
        .bind(filter.starts_after)
        .bind(filter.starts_before)
        .bind(filter.category)
        .bind(filter.normalized_search())
        .bind(page.sql_limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list events", e))?;
        Ok(rows.into_iter().map(EventSummary::from).collect())
    }

    async fn count_events(&self, filter: &EventFilter) -> AppResult<u64> {
        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM events e {FILTER_CLAUSE}"))
                .bind(filter.created_by)
                .bind(filter.starts_after)
                .bind(filter.starts_before)
                .bind(filter.category)
                .bind(filter.normalized_search())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    AppError::with_source(ErrorKind::Database, "Failed to count events", e)
                })?;
        Ok(u64::try_from(total).unwrap_or(0))
    }
}
