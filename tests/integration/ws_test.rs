//! WebSocket notification channel tests against a real listener, using
//! `tokio-tungstenite` as the client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tower::ServiceExt;

use rsvphub_api::{AppState, build_app};
use rsvphub_auth::{JwtDecoder, JwtEncoder};
use rsvphub_broker::{EventPublisher, MemoryBroker};
use rsvphub_cache::memory::MemoryCacheProvider;
use rsvphub_cache::CacheInvalidator;
use rsvphub_core::config::cache::MemoryCacheConfig;
use rsvphub_core::config::{AppConfig, AuthConfig, BrokerConfig, RealtimeConfig};
use rsvphub_core::traits::CacheProvider;
use rsvphub_core::types::id::{EventId, UserId};
use rsvphub_database::MemoryStore;
use rsvphub_database::store::{EventStore, UserStore};
use rsvphub_entity::event::{CreateEvent, EventCategory};
use rsvphub_entity::rsvp::RsvpStatus;
use rsvphub_entity::user::{CreateUser, UserRole};
use rsvphub_realtime::ConnectionRegistry;
use rsvphub_service::RsvpService;
use rsvphub_worker::{
    ConsumerState, ConsumerSupervisor, MessageDispatcher, NotificationConsumer,
    RsvpCreatedHandler,
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Server {
    addr: SocketAddr,
    state: AppState,
    store: MemoryStore,
    rsvp_service: RsvpService,
    encoder: JwtEncoder,
}

impl Server {
    async fn start(max_connections_per_user: usize) -> Self {
        let config = AppConfig {
            auth: AuthConfig {
                jwt_secret: "ws-test-secret".to_string(),
                ..Default::default()
            },
            realtime: RealtimeConfig {
                max_connections_per_user,
                ..Default::default()
            },
            broker: BrokerConfig {
                block_timeout_ms: 50,
                ..Default::default()
            },
            ..Default::default()
        };

        let store = MemoryStore::new();
        let cache: Arc<dyn CacheProvider> =
            Arc::new(MemoryCacheProvider::new(&MemoryCacheConfig::default(), 300));
        let broker = MemoryBroker::new();
        let publisher = Arc::new(EventPublisher::new(
            Arc::new(broker.clone()),
            config.broker.exchange.clone(),
        ));
        let registry = Arc::new(ConnectionRegistry::new(&config.realtime));

        let mut dispatcher = MessageDispatcher::new();
        dispatcher.register(Arc::new(RsvpCreatedHandler::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::clone(&registry),
        )));
        let supervisor = Arc::new(ConsumerSupervisor::start(NotificationConsumer::new(
            Arc::new(broker),
            &config.broker,
            &config.worker,
            dispatcher,
        )));
        let mut consumer_state = supervisor.subscribe();
        timeout(
            Duration::from_secs(5),
            consumer_state.wait_for(|s| *s == ConsumerState::Consuming),
        )
        .await
        .expect("consumer started in time")
        .expect("consumer alive");

        let state = AppState {
            config: Arc::new(config.clone()),
            jwt_decoder: Arc::new(JwtDecoder::new(&config.auth, Arc::clone(&cache))),
            registry,
            supervisor: Some(supervisor),
        };
        let rsvp_service = RsvpService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            CacheInvalidator::new(cache),
            publisher,
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = build_app(state.clone(), &config.server.cors);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            store,
            rsvp_service,
            encoder: JwtEncoder::new(&config.auth),
        }
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

    async fn event(&self, owner: UserId) -> EventId {
        self.store
            .create_event(
                owner,
                &CreateEvent {
                    title: "Rust Meetup".to_string(),
                    description: None,
                    location: None,
                    starts_at: None,
                    capacity: 10,
                    category: EventCategory::Technology,
                },
            )
            .await
            .unwrap()
            .id
    }

    fn url(&self, user_id: UserId, token: &str) -> String {
        format!("ws://{}/ws/notifications/{user_id}?token={token}", self.addr)
    }

    fn token(&self, user_id: UserId) -> String {
        self.encoder
            .generate_access_token(user_id, UserRole::User)
            .unwrap()
    }

    /// Open a channel for `user_id` and wait until the registry has it.
    async fn connect(&self, user_id: UserId) -> Client {
        let before = self.state.registry.connection_count().await;
        let (client, _) = connect_async(self.url(user_id, &self.token(user_id)))
            .await
            .expect("upgrade accepted");
        timeout(Duration::from_secs(5), async {
            while self.state.registry.connection_count().await <= before {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("channel registered in time");
        client
    }
}

async fn next_json(client: &mut Client) -> serde_json::Value {
    loop {
        let frame = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("frame arrived in time")
            .expect("stream open")
            .expect("valid frame");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn expect_refused(url: &str) -> StatusCode {
    match connect_async(url).await {
        Ok(_) => panic!("upgrade should have been refused"),
        Err(WsError::Http(response)) => StatusCode::from_u16(response.status().as_u16()).unwrap(),
        Err(e) => panic!("unexpected error: {e}"),
    }
}

#[tokio::test]
async fn test_upgrade_refused_without_valid_token() {
    let server = Server::start(5).await;
    let user_id = server.user("ana@example.com").await;

    let status = expect_refused(&format!(
        "ws://{}/ws/notifications/{user_id}",
        server.addr
    ))
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let status = expect_refused(&server.url(user_id, "garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let someone_else = server.token(UserId::new());
    let status = expect_refused(&server.url(user_id, &someone_else)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert_eq!(server.state.registry.connection_count().await, 0);
}

#[tokio::test]
async fn test_revoked_token_is_refused() {
    let server = Server::start(5).await;
    let user_id = server.user("ana@example.com").await;
    let token = server.token(user_id);

    let claims = server
        .state
        .jwt_decoder
        .decode_access_token(&token)
        .await
        .unwrap();
    server.state.jwt_decoder.revoke(&claims).await.unwrap();

    let status = expect_refused(&server.url(user_id, &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_ping_pong_and_invalid_message() {
    let server = Server::start(5).await;
    let user_id = server.user("ana@example.com").await;
    let mut client = server.connect(user_id).await;

    client
        .send(Message::text(r#"{"type":"ping"}"#))
        .await
        .unwrap();
    assert_eq!(next_json(&mut client).await, serde_json::json!({"type": "pong"}));

    client.send(Message::text("hello")).await.unwrap();
    let reply = next_json(&mut client).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["code"], "INVALID_MESSAGE");
}

#[tokio::test]
async fn test_rsvp_pushes_reach_both_sockets() {
    let server = Server::start(5).await;
    let owner = server.user("owner@example.com").await;
    let guest = server.user("guest@example.com").await;
    let event_id = server.event(owner).await;

    let mut owner_client = server.connect(owner).await;
    let mut guest_client = server.connect(guest).await;

    server
        .rsvp_service
        .create_rsvp(guest, event_id, RsvpStatus::Going)
        .await
        .unwrap();

    let to_owner = next_json(&mut owner_client).await;
    assert_eq!(to_owner["type"], "rsvp.created");
    assert_eq!(to_owner["event_id"], event_id.to_string());
    assert_eq!(to_owner["event_title"], "Rust Meetup");
    assert_eq!(to_owner["user_email"], "guest@example.com");

    let to_guest = next_json(&mut guest_client).await;
    assert_eq!(to_guest["type"], "rsvp.confirmation");
    assert_eq!(to_guest["event_id"], event_id.to_string());
    assert_eq!(to_guest["event"], "Rust Meetup");
}

#[tokio::test]
async fn test_client_close_unregisters_channel() {
    let server = Server::start(5).await;
    let user_id = server.user("ana@example.com").await;
    let mut client = server.connect(user_id).await;
    assert!(server.state.registry.is_online(user_id).await);

    client.close(None).await.unwrap();

    timeout(Duration::from_secs(5), async {
        while server.state.registry.is_online(user_id).await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("channel removed in time");
}

#[tokio::test]
async fn test_connection_cap_closes_oldest_socket() {
    let server = Server::start(1).await;
    let user_id = server.user("ana@example.com").await;

    let mut first = server.connect(user_id).await;
    let (mut second, _) = connect_async(server.url(user_id, &server.token(user_id)))
        .await
        .unwrap();

    // the evicted socket receives a close frame
    let closed = timeout(Duration::from_secs(5), async {
        loop {
            match first.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "oldest socket was not closed");

    second
        .send(Message::text(r#"{"type":"ping"}"#))
        .await
        .unwrap();
    assert_eq!(next_json(&mut second).await["type"], "pong");
    assert_eq!(server.state.registry.connection_count().await, 1);
}

#[tokio::test]
async fn test_close_all_disconnects_clients() {
    let server = Server::start(5).await;
    let user_id = server.user("ana@example.com").await;
    let mut client = server.connect(user_id).await;

    assert_eq!(server.state.registry.close_all().await, 1);

    let frame = timeout(Duration::from_secs(5), client.next())
        .await
        .expect("close arrived in time");
    assert!(matches!(frame, Some(Ok(Message::Close(_))) | None));
}

#[tokio::test]
async fn test_health_reports_consumer_and_connections() {
    let server = Server::start(5).await;
    let user_id = server.user("ana@example.com").await;
    let _client = server.connect(user_id).await;

    let app = build_app(server.state.clone(), &server.state.config.server.cors);
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["consumer"]["state"], "consuming");
    assert_eq!(body["consumer"]["processed"], 0);
    assert_eq!(body["connections"], 1);
    assert_eq!(body["online_users"], 1);
}
