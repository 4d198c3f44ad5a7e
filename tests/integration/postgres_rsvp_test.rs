//! Capacity and duplicate enforcement of [`RsvpRepository`] against a live
//! PostgreSQL server.
//!
//! Set `RSVPHUB_TEST_DATABASE_URL` to run these; without it every test
//! returns early. Each test works inside its own throwaway schema.

use std::str::FromStr;

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use rsvphub_core::error::ErrorKind;
use rsvphub_core::result::AppResult;
use rsvphub_core::types::id::{EventId, UserId};
use rsvphub_database::RsvpRepository;
use rsvphub_database::repositories::rsvp::UNIQUE_USER_EVENT;
use rsvphub_database::store::RsvpStore;
use rsvphub_entity::rsvp::{CreateRsvp, Rsvp, RsvpStatus};

const DATABASE_URL_VAR: &str = "RSVPHUB_TEST_DATABASE_URL";

/// A schema holding just the columns the RSVP write path touches.
struct TestSchema {
    admin: PgPool,
    pool: PgPool,
    name: String,
}

impl TestSchema {
    async fn create() -> Option<Self> {
        let url = match std::env::var(DATABASE_URL_VAR) {
            Ok(url) => url,
            Err(_) => {
                eprintln!("{DATABASE_URL_VAR} not set, skipping PostgreSQL test");
                return None;
            }
        };

        let name = format!("rsvphub_test_{}", EventId::new().to_string().replace('-', ""));
        let admin = PgPoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .unwrap();
        sqlx::query(&format!("CREATE SCHEMA {name}"))
            .execute(&admin)
            .await
            .unwrap();

        let options = PgConnectOptions::from_str(&url)
            .unwrap()
            .options([("search_path", name.as_str())]);
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect_with(options)
            .await
            .unwrap();

        for ddl in [
            "CREATE TYPE rsvp_status AS ENUM ('going', 'interested', 'cancelled')".to_string(),
            "CREATE TABLE events (id UUID PRIMARY KEY, capacity INTEGER NOT NULL DEFAULT 0)"
                .to_string(),
            format!(
                "CREATE TABLE rsvps (\
                 id UUID PRIMARY KEY, \
                 user_id UUID NOT NULL, \
                 event_id UUID NOT NULL REFERENCES events (id) ON DELETE CASCADE, \
                 status rsvp_status NOT NULL DEFAULT 'going', \
                 created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(), \
                 CONSTRAINT {UNIQUE_USER_EVENT} UNIQUE (user_id, event_id))"
            ),
        ] {
            sqlx::query(&ddl).execute(&pool).await.unwrap();
        }

        Some(Self { admin, pool, name })
    }

    async fn insert_event(&self, capacity: i32) -> EventId {
        let id = EventId::new();
        sqlx::query("INSERT INTO events (id, capacity) VALUES ($1, $2)")
            .bind(id)
            .bind(capacity)
            .execute(&self.pool)
            .await
            .unwrap();
        id
    }

    async fn teardown(self) {
        self.pool.close().await;
        sqlx::query(&format!("DROP SCHEMA {} CASCADE", self.name))
            .execute(&self.admin)
            .await
            .unwrap();
    }
}

async fn race(repo: &RsvpRepository, requests: Vec<CreateRsvp>) -> Vec<AppResult<Rsvp>> {
    let handles: Vec<_> = requests
        .into_iter()
        .map(|data| {
            let repo = repo.clone();
            tokio::spawn(async move { repo.create_within_capacity(&data).await })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_going_writes_stop_at_capacity() {
    let Some(schema) = TestSchema::create().await else {
        return;
    };
    const CAPACITY: i32 = 5;
    const WRITERS: usize = 24;

    let event_id = schema.insert_event(CAPACITY).await;
    let repo = RsvpRepository::new(schema.pool.clone());

    let requests = (0..WRITERS)
        .map(|_| CreateRsvp::new(event_id, UserId::new(), RsvpStatus::Going))
        .collect();
    let results = race(&repo, requests).await;

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(accepted, CAPACITY as usize);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.kind, ErrorKind::CapacityExceeded);
    }
    assert_eq!(repo.count_going(event_id).await.unwrap(), i64::from(CAPACITY));

    // Non-going answers never take a slot, so they still land on a full event.
    let interested = CreateRsvp::new(event_id, UserId::new(), RsvpStatus::Interested);
    repo.create_within_capacity(&interested).await.unwrap();
    assert_eq!(repo.count_going(event_id).await.unwrap(), i64::from(CAPACITY));

    schema.teardown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_user_writes_have_one_winner() {
    let Some(schema) = TestSchema::create().await else {
        return;
    };
    const WRITERS: usize = 12;

    let event_id = schema.insert_event(0).await;
    let repo = RsvpRepository::new(schema.pool.clone());
    let user_id = UserId::new();

    let requests = (0..WRITERS)
        .map(|_| CreateRsvp::new(event_id, user_id, RsvpStatus::Going))
        .collect();
    let results = race(&repo, requests).await;

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].user_id, user_id);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.kind, ErrorKind::DuplicateRsvp);
    }

    assert_eq!(repo.count_going(event_id).await.unwrap(), 1);
    assert_eq!(repo.list_by_event(event_id).await.unwrap().len(), 1);

    schema.teardown().await;
}

#[tokio::test]
async fn test_rsvp_for_missing_event_is_not_found() {
    let Some(schema) = TestSchema::create().await else {
        return;
    };
    let repo = RsvpRepository::new(schema.pool.clone());

    let data = CreateRsvp::new(EventId::new(), UserId::new(), RsvpStatus::Going);
    let err = repo.create_within_capacity(&data).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    schema.teardown().await;
}
