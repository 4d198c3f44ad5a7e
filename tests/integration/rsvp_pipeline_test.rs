//! End-to-end tests for the RSVP pipeline: capacity enforcement, cache
//! eviction, publication and notification fan-out, wired from the in-memory
//! store, the moka cache and the in-memory broker.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use tokio::sync::mpsc;
use tokio::time::timeout;

use rsvphub_api::error::status_for;
use rsvphub_broker::{EventPublisher, MemoryBroker};
use rsvphub_cache::memory::MemoryCacheProvider;
use rsvphub_cache::{CacheInvalidator, CacheManager, keys};
use rsvphub_core::config::cache::MemoryCacheConfig;
use rsvphub_core::config::{BrokerConfig, WorkerConfig};
use rsvphub_core::error::ErrorKind;
use rsvphub_core::events::{EVENT_CREATED, RSVP_CREATED};
use rsvphub_core::traits::CacheProvider;
use rsvphub_core::types::id::{EventId, UserId};
use rsvphub_database::MemoryStore;
use rsvphub_database::store::{EventStore, RsvpStore, UserStore};
use rsvphub_entity::event::{CreateEvent, EventCategory};
use rsvphub_entity::rsvp::RsvpStatus;
use rsvphub_entity::user::{CreateUser, UserRole};
use rsvphub_realtime::{ConnectionHandle, ConnectionRegistry, OutboundMessage};
use rsvphub_service::{EventService, RequestContext, RsvpService};
use rsvphub_worker::{
    ConsumerState, ConsumerSupervisor, MessageDispatcher, NotificationConsumer,
    RsvpCreatedHandler,
};

const EXCHANGE: &str = "rsvphub.events";
const QUEUE: &str = "rsvphub.notifications";

struct Pipeline {
    store: MemoryStore,
    cache: Arc<dyn CacheProvider>,
    broker: MemoryBroker,
    publisher: Arc<EventPublisher>,
    rsvps: Arc<RsvpService>,
    registry: Arc<ConnectionRegistry>,
}

impl Pipeline {
    fn new() -> Self {
        let store = MemoryStore::new();
        let cache: Arc<dyn CacheProvider> =
            Arc::new(MemoryCacheProvider::new(&MemoryCacheConfig::default(), 300));
        let broker = MemoryBroker::new();
        let publisher = Arc::new(EventPublisher::new(Arc::new(broker.clone()), EXCHANGE));
        let rsvps = Arc::new(RsvpService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            CacheInvalidator::new(Arc::clone(&cache)),
            Arc::clone(&publisher),
        ));
        Self {
            store,
            cache,
            broker,
            publisher,
            rsvps,
            registry: Arc::new(ConnectionRegistry::with_limit(5)),
        }
    }

    fn event_service(&self) -> EventService {
        EventService::new(
            Arc::new(self.store.clone()),
            Arc::new(CacheManager::from_provider(
                Arc::clone(&self.cache),
                Duration::from_secs(300),
            )),
            Arc::clone(&self.publisher),
        )
    }

    fn consumer(&self) -> NotificationConsumer {
        let mut dispatcher = MessageDispatcher::new();
        dispatcher.register(Arc::new(RsvpCreatedHandler::new(
            Arc::new(self.store.clone()),
            Arc::new(self.store.clone()),
            Arc::clone(&self.registry),
        )));
        let broker_config = BrokerConfig {
            block_timeout_ms: 50,
            ..Default::default()
        };
        NotificationConsumer::new(
            Arc::new(self.broker.clone()),
            &broker_config,
            &WorkerConfig::default(),
            dispatcher,
        )
    }

    async fn start_consumer(&self) -> ConsumerSupervisor {
        let supervisor = ConsumerSupervisor::start(self.consumer());
        let mut state = supervisor.subscribe();
        timeout(
            Duration::from_secs(5),
            state.wait_for(|s| *s == ConsumerState::Consuming),
        )
        .await
        .expect("consumer started in time")
        .expect("consumer alive");
        supervisor
    }

    async fn user(&self, email: &str) -> UserId {
        self.store
            .create_user(&CreateUser {
                email: email.to_string(),
                full_name: None,
                role: UserRole::User,
            })
            .await
            .unwrap()
            .id
    }

    async fn event(&self, owner: UserId, capacity: i32) -> EventId {
        self.store
            .create_event(
                owner,
                &CreateEvent {
                    title: "Rust Meetup".to_string(),
                    description: Some("Talks and pizza".to_string()),
                    location: None,
                    starts_at: None,
                    capacity,
                    category: EventCategory::Technology,
                },
            )
            .await
            .unwrap()
            .id
    }

    async fn channel(&self, user_id: UserId) -> mpsc::Receiver<OutboundMessage> {
        let (handle, rx) = ConnectionHandle::new(user_id, 16);
        self.registry.connect(user_id, Arc::new(handle)).await;
        rx
    }
}

async fn next_push(rx: &mut mpsc::Receiver<OutboundMessage>) -> OutboundMessage {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("push arrived in time")
        .expect("channel open")
}

async fn wait_processed(supervisor: &ConsumerSupervisor, count: u64) {
    timeout(Duration::from_secs(5), async {
        while supervisor.health().await.processed < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("messages processed in time");
}

async fn assert_quiet(rx: &mut mpsc::Receiver<OutboundMessage>) {
    let extra = timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(extra.is_err(), "unexpected extra push: {extra:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_going_rsvps_never_exceed_capacity() {
    let pipeline = Pipeline::new();
    let owner = pipeline.user("owner@example.com").await;
    let event_id = pipeline.event(owner, 3).await;

    let mut users = Vec::new();
    for i in 0..20 {
        users.push(pipeline.user(&format!("guest{i}@example.com")).await);
    }

    let tasks: Vec<_> = users
        .into_iter()
        .map(|user_id| {
            let rsvps = Arc::clone(&pipeline.rsvps);
            tokio::spawn(async move {
                rsvps
                    .create_rsvp(user_id, event_id, RsvpStatus::Going)
                    .await
            })
        })
        .collect();

    let mut accepted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(e) => assert_eq!(e.kind, ErrorKind::CapacityExceeded),
        }
    }

    assert_eq!(accepted, 3);
    assert_eq!(pipeline.store.count_going(event_id).await.unwrap(), 3);
    assert_eq!(pipeline.rsvps.current_going_count(event_id).await.unwrap(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_rsvp_has_one_winner() {
    let pipeline = Pipeline::new();
    let owner = pipeline.user("owner@example.com").await;
    let event_id = pipeline.event(owner, 0).await;
    let guest = pipeline.user("guest@example.com").await;

    let first = {
        let rsvps = Arc::clone(&pipeline.rsvps);
        tokio::spawn(async move { rsvps.create_rsvp(guest, event_id, RsvpStatus::Going).await })
    };
    let second = {
        let rsvps = Arc::clone(&pipeline.rsvps);
        tokio::spawn(async move { rsvps.create_rsvp(guest, event_id, RsvpStatus::Going).await })
    };
    let results = [first.await.unwrap(), second.await.unwrap()];

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(loser.kind, ErrorKind::DuplicateRsvp);
    assert_eq!(pipeline.rsvps.list_event_rsvps(event_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_sequential_capacity_and_status_scenarios() {
    let pipeline = Pipeline::new();
    let owner = pipeline.user("owner@example.com").await;
    let a = pipeline.user("a@example.com").await;
    let b = pipeline.user("b@example.com").await;

    // capacity 1: A going, then B going is rejected
    let full = pipeline.event(owner, 1).await;
    pipeline.rsvps.create_rsvp(a, full, RsvpStatus::Going).await.unwrap();
    let err = pipeline
        .rsvps
        .create_rsvp(b, full, RsvpStatus::Going)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::CapacityExceeded);
    assert_eq!(status_for(err.kind), (StatusCode::BAD_REQUEST, "CAPACITY_EXCEEDED"));

    // interested never counts against capacity
    let open = pipeline.event(owner, 1).await;
    pipeline.rsvps.create_rsvp(a, open, RsvpStatus::Interested).await.unwrap();
    pipeline.rsvps.create_rsvp(b, open, RsvpStatus::Going).await.unwrap();

    // a second RSVP by the same user is a duplicate
    let err = pipeline
        .rsvps
        .create_rsvp(a, open, RsvpStatus::Going)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::DuplicateRsvp);
    assert_eq!(status_for(err.kind), (StatusCode::CONFLICT, "DUPLICATE_RSVP"));
}

#[tokio::test]
async fn test_invalidation_is_idempotent() {
    let pipeline = Pipeline::new();
    let invalidator = CacheInvalidator::new(Arc::clone(&pipeline.cache));
    let event_id = EventId::new();
    let key = keys::event_detail(event_id);

    // nothing cached yet
    invalidator.invalidate(event_id).await;

    pipeline
        .cache
        .set(&key, "{}", Duration::from_secs(60))
        .await
        .unwrap();
    invalidator.invalidate(event_id).await;
    invalidator.invalidate(event_id).await;

    assert!(!pipeline.cache.exists(&key).await.unwrap());
}

#[tokio::test]
async fn test_rsvp_round_trip_pushes_owner_and_attendee_once() {
    let pipeline = Pipeline::new();
    let owner = pipeline.user("owner@example.com").await;
    let guest = pipeline.user("guest@example.com").await;
    let event_id = pipeline.event(owner, 10).await;

    let mut owner_rx = pipeline.channel(owner).await;
    let mut guest_rx = pipeline.channel(guest).await;
    let supervisor = pipeline.start_consumer().await;

    pipeline
        .rsvps
        .create_rsvp(guest, event_id, RsvpStatus::Going)
        .await
        .unwrap();

    assert_eq!(
        next_push(&mut owner_rx).await,
        OutboundMessage::RsvpCreated {
            event_id,
            event_title: "Rust Meetup".to_string(),
            user_email: Some("guest@example.com".to_string()),
        }
    );
    assert_eq!(
        next_push(&mut guest_rx).await,
        OutboundMessage::RsvpConfirmation {
            event_id,
            event: "Rust Meetup".to_string(),
        }
    );
    wait_processed(&supervisor, 1).await;
    assert_quiet(&mut owner_rx).await;
    assert_quiet(&mut guest_rx).await;

    let health = supervisor.health().await;
    assert!(health.is_healthy());
    assert_eq!(health.processed, 1);
    assert_eq!(health.failed, 0);

    supervisor.shutdown(Duration::from_secs(5)).await.unwrap();
    assert_eq!(pipeline.broker.pending_count(QUEUE).await, 0);
}

#[tokio::test]
async fn test_closed_owner_channel_is_pruned_during_fan_out() {
    let pipeline = Pipeline::new();
    let owner = pipeline.user("owner@example.com").await;
    let guest = pipeline.user("guest@example.com").await;
    let event_id = pipeline.event(owner, 0).await;

    let stale_rx = pipeline.channel(owner).await;
    drop(stale_rx);
    let mut live_rx = pipeline.channel(owner).await;
    assert_eq!(pipeline.registry.connection_count().await, 2);

    let supervisor = pipeline.start_consumer().await;
    pipeline
        .rsvps
        .create_rsvp(guest, event_id, RsvpStatus::Going)
        .await
        .unwrap();

    assert!(matches!(
        next_push(&mut live_rx).await,
        OutboundMessage::RsvpCreated { .. }
    ));
    wait_processed(&supervisor, 1).await;
    assert_eq!(pipeline.registry.connection_count().await, 1);
    assert!(pipeline.registry.is_online(owner).await);

    supervisor.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_event_created_is_not_routed_to_notifications() {
    let pipeline = Pipeline::new();
    let organizer = pipeline
        .store
        .create_user(&CreateUser {
            email: "org@example.com".to_string(),
            full_name: Some("Org".to_string()),
            role: UserRole::Organizer,
        })
        .await
        .unwrap();
    let supervisor = pipeline.start_consumer().await;

    let ctx = RequestContext::new(organizer.id, organizer.role);
    pipeline
        .event_service()
        .create_event(
            &ctx,
            CreateEvent {
                title: "Launch Party".to_string(),
                description: None,
                location: None,
                starts_at: None,
                capacity: 0,
                category: EventCategory::Social,
            },
        )
        .await
        .unwrap();

    let published = pipeline.broker.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].routing_key, EVENT_CREATED);
    assert_eq!(pipeline.broker.ready_count(QUEUE).await, 0);
    assert_eq!(pipeline.broker.pending_count(QUEUE).await, 0);

    supervisor.shutdown(Duration::from_secs(5)).await.unwrap();
    assert_eq!(supervisor.health().await.processed, 0);
}

#[tokio::test]
async fn test_publisher_reconnects_after_broker_restart() {
    let pipeline = Pipeline::new();
    let owner = pipeline.user("owner@example.com").await;
    let a = pipeline.user("a@example.com").await;
    let b = pipeline.user("b@example.com").await;
    let event_id = pipeline.event(owner, 0).await;

    pipeline.rsvps.create_rsvp(a, event_id, RsvpStatus::Going).await.unwrap();
    pipeline.broker.drop_connections().await;
    pipeline.rsvps.create_rsvp(b, event_id, RsvpStatus::Going).await.unwrap();

    let published = pipeline.broker.published().await;
    assert_eq!(published.len(), 2);
    assert!(published.iter().all(|m| m.routing_key == RSVP_CREATED));
    assert_eq!(pipeline.broker.connect_count(), 2);
}

#[tokio::test]
async fn test_unreachable_broker_is_fatal_for_the_consumer() {
    let pipeline = Pipeline::new();
    pipeline.broker.fail_next_connects(3);
    let consumer = pipeline
        .consumer()
        .with_retry_policy(3, Duration::from_millis(10));

    let supervisor = ConsumerSupervisor::start(consumer);
    let reason = timeout(Duration::from_secs(5), supervisor.failed())
        .await
        .expect("consumer gave up in time");
    assert!(reason.contains("3 attempts"), "{reason}");
    assert!(!supervisor.health().await.is_healthy());

    let err = supervisor
        .shutdown(Duration::from_secs(5))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::FatalStartup);
}
