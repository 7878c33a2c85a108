#![allow(dead_code)]

use courier_server::adapters::memory::MemoryStore;
use courier_server::api::MgmtState;
use courier_server::config::Config;
use courier_server::domain::gateway::{ClientCommand, JoinCommand, ServerEvent};
use courier_server::domain::group::Group;
use courier_server::domain::user::User;
use courier_server::{AppBuilder, telemetry};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

pub fn get_test_config() -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.mgmt_port = 0;
    config.lifecycle.sweep_interval_secs = 1;
    config
}

pub struct TestApp {
    pub server_url: String,
    pub ws_url: String,
    pub mgmt_url: String,
    pub client: reqwest::Client,
    pub store: Arc<MemoryStore>,
    pub config: Config,
    pub shutdown_tx: watch::Sender<bool>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_config(get_test_config()).await
    }

    pub async fn spawn_with_config(config: Config) -> Self {
        telemetry::init_test_telemetry();

        let store = Arc::new(MemoryStore::new());
        let app = AppBuilder::new(config.clone()).with_memory(Arc::clone(&store)).build().expect("Failed to build app");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let api_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mgmt_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let api_addr = api_listener.local_addr().unwrap();
        let mgmt_addr = mgmt_listener.local_addr().unwrap();

        let app_router = courier_server::api::app_router(config.clone(), app.services, shutdown_rx.clone());
        let mgmt_router = courier_server::api::mgmt_router(MgmtState { health_service: app.health_service });

        let _workers = app.workers.spawn_all(shutdown_rx.clone());

        let mut api_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            axum::serve(api_listener, app_router.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async move {
                    let _ = api_rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });

        let mut mgmt_rx = shutdown_rx;
        tokio::spawn(async move {
            axum::serve(mgmt_listener, mgmt_router.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async move {
                    let _ = mgmt_rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });

        Self {
            server_url: format!("http://{api_addr}"),
            ws_url: format!("ws://{api_addr}/v1/gateway"),
            mgmt_url: format!("http://{mgmt_addr}"),
            client: reqwest::Client::new(),
            store,
            config,
            shutdown_tx,
        }
    }

    /// Seeds a user whose email is `<name>@example.com`.
    pub fn seed_user(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.store.insert_user(User::new(id, format!("{name}@example.com"), name));
        id
    }

    pub fn seed_group(&self, creator: Uuid, others: &[Uuid], admins: &[Uuid]) -> Uuid {
        let id = Uuid::new_v4();
        let mut members = vec![creator];
        members.extend_from_slice(others);
        self.store.insert_group(Group::new(id, "test group", creator, members, admins.to_vec()));
        id
    }

    pub async fn connect_ws(&self) -> TestClient {
        let (stream, _) = connect_async(&self.ws_url).await.expect("Failed to connect");
        TestClient { stream }
    }

    /// Connects and binds the socket to `user_id`.
    pub async fn join(&self, user_id: Uuid) -> TestClient {
        let mut client = self.connect_ws().await;
        client.send(&ClientCommand::Join(JoinCommand { user_id })).await;
        match client.receive_event().await {
            Some(ServerEvent::Joined(joined)) => assert_eq!(joined.user_id, user_id),
            other => panic!("Expected joined, got {other:?}"),
        }
        client
    }

    pub async fn get_json(&self, path: &str) -> (reqwest::StatusCode, serde_json::Value) {
        let resp = self.client.get(format!("{}{path}", self.server_url)).send().await.unwrap();
        let status = resp.status();
        let body = resp.json().await.unwrap_or(serde_json::Value::Null);
        (status, body)
    }
}

pub struct TestClient {
    pub stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl TestClient {
    pub async fn send(&mut self, command: &ClientCommand) {
        self.send_raw(&serde_json::to_string(command).unwrap()).await;
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.stream.send(Message::Text(text.into())).await.unwrap();
    }

    pub async fn receive_event(&mut self) -> Option<ServerEvent> {
        self.receive_event_timeout(Duration::from_secs(5)).await
    }

    /// Next JSON event within `timeout`, skipping control frames.
    pub async fn receive_event_timeout(&mut self, timeout: Duration) -> Option<ServerEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let msg = tokio::time::timeout_at(deadline, self.stream.next()).await.ok()??;
            match msg.ok()? {
                Message::Text(text) => return Some(serde_json::from_str(&text).unwrap()),
                Message::Close(_) => return None,
                _ => {}
            }
        }
    }

    /// Next raw frame within `timeout`, control frames included.
    pub async fn receive_raw_timeout(&mut self, timeout: Duration) -> Option<Message> {
        tokio::time::timeout(timeout, self.stream.next()).await.ok()?.and_then(Result::ok)
    }

    pub async fn expect_silence(&mut self, timeout: Duration) {
        if let Some(event) = self.receive_event_timeout(timeout).await {
            panic!("Expected no event, got {event:?}");
        }
    }
}
