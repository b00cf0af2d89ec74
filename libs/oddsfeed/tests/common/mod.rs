// Common test utilities for oddsfeed integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use oddsfeed::domain::{Event, Match, Odds, Result};
use oddsfeed::processing::{DataStorage, EventQuery, InMemoryStorage, MatchQuery};
use oddsfeed::{FeedService, ServiceConfig};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

/// Print only when TEST_VERBOSE is set
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);
pub const QUIET_PERIOD: Duration = Duration::from_millis(300);

/// In-memory storage that counts how often each event id is saved
#[derive(Default)]
pub struct CountingStorage {
    inner: InMemoryStorage,
    saves: Mutex<HashMap<String, usize>>,
}

impl CountingStorage {
    pub fn saves_of(&self, event_id: &str) -> usize {
        self.saves.lock().get(event_id).copied().unwrap_or(0)
    }

    pub fn total_saves(&self) -> usize {
        self.saves.lock().values().sum()
    }
}

#[async_trait]
impl DataStorage for CountingStorage {
    async fn save_event(&self, event: &Event) -> Result<()> {
        self.inner.save_event(event).await?;
        *self.saves.lock().entry(event.id.clone()).or_insert(0) += 1;
        Ok(())
    }

    async fn save_match(&self, m: &Match) -> Result<()> {
        self.inner.save_match(m).await
    }

    async fn save_odds(&self, odds: &Odds) -> Result<()> {
        self.inner.save_odds(odds).await
    }

    async fn get_event(&self, id: &str) -> Result<Event> {
        self.inner.get_event(id).await
    }

    async fn get_match(&self, id: &str) -> Result<Match> {
        self.inner.get_match(id).await
    }

    async fn get_odds(&self, match_id: &str) -> Result<Vec<Odds>> {
        self.inner.get_odds(match_id).await
    }

    async fn query_events(&self, query: &EventQuery) -> Result<Vec<Event>> {
        self.inner.query_events(query).await
    }

    async fn query_matches(&self, query: &MatchQuery) -> Result<Vec<Match>> {
        self.inner.query_matches(query).await
    }
}

/// A fully wired feed service listening on an ephemeral local port
pub struct TestService {
    pub service: FeedService,
    pub storage: Arc<CountingStorage>,
    pub addr: SocketAddr,
    token: CancellationToken,
}

impl TestService {
    pub async fn start() -> Self {
        Self::start_with(ServiceConfig::default()).await
    }

    pub async fn start_with(mut config: ServiceConfig) -> Self {
        config.websocket.write_timeout_ms = 1000;

        let storage = Arc::new(CountingStorage::default());
        let service = FeedService::new(config, storage.clone());
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");

        let token = CancellationToken::new();
        let addr = service
            .start(listener, &token)
            .await
            .expect("Failed to start feed service");
        verbose_println!("Feed service listening on {}", addr);

        Self {
            service,
            storage,
            addr,
            token,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub async fn client(&self) -> TestClient {
        TestClient::connect(&self.ws_url()).await
    }

    pub async fn publish(&self, event: Event) {
        self.service
            .source
            .publish(event)
            .await
            .expect("Failed to publish event");
    }

    /// Minimal HTTP/1.1 GET. Returns the status code and body.
    pub async fn http_get(&self, path: &str) -> (u16, String) {
        let mut stream = TcpStream::connect(self.addr)
            .await
            .expect("Failed to connect to HTTP server");
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            path, self.addr
        );
        stream.write_all(request.as_bytes()).await.expect("Failed to write request");

        let mut raw = Vec::new();
        tokio::time::timeout(RECV_TIMEOUT, stream.read_to_end(&mut raw))
            .await
            .expect("HTTP response timed out")
            .expect("Failed to read response");
        let raw = String::from_utf8_lossy(&raw).to_string();

        let status = raw
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .expect("Malformed status line");
        let body = raw
            .split_once("\r\n\r\n")
            .map(|(_, body)| body.to_string())
            .unwrap_or_default();
        (status, body)
    }

    pub async fn stop(self) {
        self.token.cancel();
        self.service.shutdown().await;
    }
}

impl Drop for TestService {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client speaking the feed's JSON frames
pub struct TestClient {
    stream: WsStream,
    pub client_id: String,
}

impl TestClient {
    /// Connect and consume the welcome frame
    pub async fn connect(url: &str) -> Self {
        let (stream, _) = connect_async(url).await.expect("Failed to connect");
        let mut client = Self {
            stream,
            client_id: String::new(),
        };

        let welcome = client.recv_type("welcome").await;
        client.client_id = welcome["client_id"]
            .as_str()
            .expect("welcome without client_id")
            .to_string();
        verbose_println!("Client {} connected", client.client_id);
        client
    }

    pub async fn send_json(&mut self, frame: Value) {
        self.send_text(&frame.to_string()).await;
    }

    pub async fn send_text(&mut self, text: &str) {
        self.stream
            .send(Message::Text(text.to_string()))
            .await
            .expect("Failed to send frame");
    }

    /// Next JSON frame of any type. `None` on timeout or close.
    pub async fn recv_any(&mut self, timeout: Duration) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let next = tokio::time::timeout_at(deadline, self.stream.next()).await.ok()??;
            match next {
                Ok(Message::Text(text)) => {
                    return Some(serde_json::from_str(&text).expect("Server sent invalid JSON"))
                }
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
    }

    /// Next frame that is not a heartbeat
    pub async fn recv_frame(&mut self, timeout: Duration) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let frame = self.recv_any(remaining).await?;
            if frame["type"] != "heartbeat" {
                return Some(frame);
            }
        }
    }

    /// Next non-heartbeat frame, which must have type `frame_type`
    pub async fn recv_type(&mut self, frame_type: &str) -> Value {
        let frame = self
            .recv_frame(RECV_TIMEOUT)
            .await
            .unwrap_or_else(|| panic!("No {} frame received", frame_type));
        assert_eq!(frame["type"], frame_type, "unexpected frame: {}", frame);
        frame
    }

    /// Ping and wait for the pong. Frames are handled in order, so every
    /// frame sent before this one has been applied once it returns.
    pub async fn sync(&mut self) {
        self.send_json(json!({"type": "ping"})).await;
        self.recv_type("pong").await;
    }

    pub async fn subscribe(&mut self, match_id: &str) {
        self.send_json(json!({"type": "subscribe", "match_id": match_id}))
            .await;
        self.sync().await;
    }

    pub async fn unsubscribe(&mut self, match_id: &str) {
        self.send_json(json!({"type": "unsubscribe", "match_id": match_id}))
            .await;
        self.sync().await;
    }

    /// Event ids received until the connection has been quiet for
    /// `QUIET_PERIOD`, sorted
    pub async fn collect_event_ids(&mut self) -> Vec<String> {
        let mut ids = Vec::new();
        while let Some(frame) = self.recv_frame(QUIET_PERIOD).await {
            if frame["type"] == "event" {
                ids.push(frame["event_id"].as_str().unwrap_or_default().to_string());
            }
        }
        ids.sort();
        ids
    }

    /// True when the server has closed the connection
    pub async fn is_closed(&mut self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.stream.next()).await {
                Err(_) => return false,
                Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => return true,
                Ok(Some(Ok(_))) => continue,
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// Poll `condition` every 20ms until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
