//! RSVP repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use rsvphub_core::error::{AppError, ErrorKind};
use rsvphub_core::result::AppResult;
use rsvphub_core::types::id::{EventId, RsvpId, UserId};
use rsvphub_entity::rsvp::{CreateRsvp, Rsvp};

use crate::store::{DUPLICATE_RSVP_MESSAGE, RsvpStore, capacity_message};

/// Name of the unique constraint over `(user_id, event_id)`.
pub const UNIQUE_USER_EVENT: &str = "uq_user_event_rsvp";

const RSVP_COLUMNS: &str = "id, user_id, event_id, status, created_at";

/// Repository for RSVPs and going counts.
#[derive(Debug, Clone)]
pub struct RsvpRepository {
    pool: PgPool,
}

impl RsvpRepository {
    /// Create a new RSVP repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Only the `(user_id, event_id)` constraint means a duplicate RSVP. Any
/// other violation, such as a primary key clash, is a database fault.
fn is_duplicate_rsvp(constraint: Option<&str>) -> bool {
    constraint == Some(UNIQUE_USER_EVENT)
}

fn map_insert_error(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::Database(ref db_err) if is_duplicate_rsvp(db_err.constraint()) => {
            AppError::duplicate_rsvp(DUPLICATE_RSVP_MESSAGE)
        }
        _ => AppError::with_source(ErrorKind::Database, "Failed to create RSVP", e),
    }
}

#[async_trait]
impl RsvpStore for RsvpRepository {
    async fn count_going(&self, event_id: EventId) -> AppResult<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM rsvps WHERE event_id = $1 AND status = 'going'",
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count RSVPs", e))
    }

    async fn create_within_capacity(&self, data: &CreateRsvp) -> AppResult<Rsvp> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;

        // The row lock serializes every writer for this event until commit.
        let capacity: Option<i32> =
            sqlx::query_scalar("SELECT capacity FROM events WHERE id = $1 FOR UPDATE")
                .bind(data.event_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::with_source(ErrorKind::Database, "Failed to lock event", e)
                })?;
        let Some(capacity) = capacity else {
            return Err(AppError::not_found("Event not found"));
        };

        if capacity > 0 && data.status.counts_against_capacity() {
            let going: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM rsvps WHERE event_id = $1 AND status = 'going'",
            )
            .bind(data.event_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count RSVPs", e))?;
            if going >= i64::from(capacity) {
                debug!(event_id = %data.event_id, going, capacity, "Capacity reached under lock");
                return Err(AppError::capacity_exceeded(capacity_message(capacity)));
            }
        }

        let rsvp = sqlx::query_as::<_, Rsvp>(&format!(
            "INSERT INTO rsvps (id, user_id, event_id, status) VALUES ($1, $2, $3, $4) \
             RETURNING {RSVP_COLUMNS}"
        ))
        .bind(RsvpId::new())
        .bind(data.user_id)
        .bind(data.event_id)
        .bind(data.status)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_insert_error)?;

        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit RSVP", e)
        })?;
        Ok(rsvp)
    }

    async fn find_rsvp(&self, user_id: UserId, event_id: EventId) -> AppResult<Option<Rsvp>> {
        sqlx::query_as::<_, Rsvp>(&format!(
            "SELECT {RSVP_COLUMNS} FROM rsvps WHERE user_id = $1 AND event_id = $2"
        ))
        .bind(user_id)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find RSVP", e))
    }

    async fn list_by_event(&self, event_id: EventId) -> AppResult<Vec<Rsvp>> {
        sqlx::query_as::<_, Rsvp>(&format!(
            "SELECT {RSVP_COLUMNS} FROM rsvps WHERE event_id = $1 ORDER BY created_at ASC"
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list RSVPs for event", e)
        })
    }

    async fn list_by_user(&self, user_id: UserId) -> AppResult<Vec<Rsvp>> {
        sqlx::query_as::<_, Rsvp>(&format!(
            "SELECT {RSVP_COLUMNS} FROM rsvps WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list RSVPs for user", e)
        })
    }
}
