//! WebSocket fan-out server
//!
//! Each connected client has its own [`MatchFilter`]; a new client receives
//! every event until it subscribes to specific matches. The server is a
//! single wildcard subscriber on the dispatcher and re-filters per client.
//!
//! Writes to one client never block or fail delivery to another. A failed
//! event write is logged and the connection stays open; a client is only
//! removed when its read side errors or closes.

use async_trait::async_trait;
use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::frames::{ClientFrame, ServerFrame};
use crate::domain::{Event, EventFilter, FeedError, MatchFilter, Result};
use crate::processing::{EventDispatcher, EventHandler, Subscriber};
use crate::utils::spawn_ticker;

pub const DISPATCHER_SUBSCRIBER_ID: &str = "websocket-server";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Fixed at 30s in deployments. Only tests shorten it, to observe
    /// heartbeat frames without waiting a full period.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_write_timeout_ms() -> u64 {
    5000
}

impl Default for WsServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl WsServerConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Public view of a connected client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    pub client_id: String,
    pub connected_at: DateTime<Utc>,
    /// Empty when the client receives every match
    pub match_ids: Vec<String>,
}

struct WsClient {
    id: String,
    connected_at: DateTime<Utc>,
    sink: Mutex<SplitSink<WebSocket, Message>>,
    filter: RwLock<MatchFilter>,
}

impl WsClient {
    async fn send(&self, payload: Utf8Bytes, timeout: Duration) -> Result<()> {
        let write = async {
            let mut sink = self.sink.lock().await;
            sink.send(Message::Text(payload)).await
        };
        match tokio::time::timeout(timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(FeedError::ProcessingFailed(format!(
                "write to client {} failed: {}",
                self.id, e
            ))),
            Err(_) => Err(FeedError::Timeout(format!("write to client {}", self.id))),
        }
    }

    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            debug!(client_id = %self.id, error = %e, "[WS Server] Close failed");
        }
    }

    fn info(&self) -> ClientInfo {
        ClientInfo {
            client_id: self.id.clone(),
            connected_at: self.connected_at,
            match_ids: self.filter.read().match_ids(),
        }
    }
}

fn encode(frame: &impl Serialize) -> Result<Utf8Bytes> {
    serde_json::to_string(frame)
        .map(Utf8Bytes::from)
        .map_err(|e| FeedError::ProcessingFailed(format!("frame encoding failed: {}", e)))
}

pub struct WsServer {
    clients: RwLock<HashMap<String, Arc<WsClient>>>,
    config: WsServerConfig,
    token: CancellationToken,
}

impl WsServer {
    pub fn new(config: WsServerConfig) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            config,
            token: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &WsServerConfig {
        &self.config
    }

    /// Register the server as a wildcard subscriber on `dispatcher`
    pub fn attach(self: &Arc<Self>, dispatcher: &EventDispatcher) {
        let handler: Arc<dyn EventHandler> = Arc::clone(self) as Arc<dyn EventHandler>;
        dispatcher.subscribe(Subscriber::new(
            DISPATCHER_SUBSCRIBER_ID,
            EventFilter::all(),
            handler,
        ));
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    pub fn clients(&self) -> Vec<ClientInfo> {
        let mut clients: Vec<ClientInfo> = self.clients.read().values().map(|c| c.info()).collect();
        clients.sort_by(|a, b| a.connected_at.cmp(&b.connected_at));
        clients
    }

    pub fn client_filter(&self, client_id: &str) -> Option<MatchFilter> {
        self.clients
            .read()
            .get(client_id)
            .map(|client| client.filter.read().clone())
    }

    /// Serve one upgraded connection until it closes
    pub async fn handle_socket(self: Arc<Self>, socket: WebSocket) {
        let (sink, mut stream) = socket.split();
        let client = Arc::new(WsClient {
            id: Uuid::new_v4().to_string(),
            connected_at: Utc::now(),
            sink: Mutex::new(sink),
            filter: RwLock::new(MatchFilter::All),
        });
        let client_id = client.id.clone();

        let count = {
            let mut clients = self.clients.write();
            clients.insert(client_id.clone(), Arc::clone(&client));
            clients.len()
        };
        info!(client_id = %client_id, clients = count, "[WS Server] Client connected");

        let welcome = match encode(&ServerFrame::welcome(&client_id)) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "[WS Server] Welcome encoding failed");
                self.remove_client(&client_id).await;
                return;
            }
        };
        if let Err(e) = client.send(welcome, self.config.write_timeout()).await {
            warn!(client_id = %client_id, error = %e, "[WS Server] Welcome failed");
            self.remove_client(&client_id).await;
            return;
        }

        self.spawn_heartbeat(&client_id);

        loop {
            let message = tokio::select! {
                _ = self.token.cancelled() => break,
                message = stream.next() => message,
            };

            match message {
                Some(Ok(Message::Text(text))) => self.handle_client_frame(&client, text.as_str()).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(client_id = %client_id, error = %e, "[WS Server] Read error");
                    break;
                }
            }
        }

        self.remove_client(&client_id).await;
    }

    async fn handle_client_frame(&self, client: &WsClient, text: &str) {
        match ClientFrame::parse(text) {
            Some(ClientFrame::Subscribe { match_id }) => {
                debug!(client_id = %client.id, match_id = %match_id, "[WS Server] Client subscribed");
                client.filter.write().subscribe(match_id);
            }
            Some(ClientFrame::Unsubscribe { match_id }) => {
                debug!(client_id = %client.id, match_id = %match_id, "[WS Server] Client unsubscribed");
                client.filter.write().unsubscribe(&match_id);
            }
            Some(ClientFrame::Ping) => {
                let sent = match encode(&ServerFrame::pong()) {
                    Ok(payload) => client.send(payload, self.config.write_timeout()).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = sent {
                    warn!(client_id = %client.id, error = %e, "[WS Server] Pong failed");
                }
            }
            None => {
                debug!(client_id = %client.id, "[WS Server] Ignoring unrecognized frame");
            }
        }
    }

    fn spawn_heartbeat(self: &Arc<Self>, client_id: &str) {
        let server = Arc::clone(self);
        let client_id = client_id.to_string();
        let name = format!("ws-heartbeat-{}", client_id);

        spawn_ticker(name, self.config.heartbeat_interval(), self.token.child_token(), move || {
            let server = Arc::clone(&server);
            let client_id = client_id.clone();
            async move {
                let client = match server.clients.read().get(&client_id) {
                    Some(client) => Arc::clone(client),
                    None => return ControlFlow::Break(()),
                };
                let sent = match encode(&ServerFrame::heartbeat()) {
                    Ok(payload) => client.send(payload, server.config.write_timeout()).await,
                    Err(e) => Err(e),
                };
                match sent {
                    Ok(()) => ControlFlow::Continue(()),
                    Err(e) => {
                        debug!(client_id = %client_id, error = %e, "[WS Server] Heartbeat failed");
                        ControlFlow::Break(())
                    }
                }
            }
        });
    }

    async fn remove_client(&self, client_id: &str) {
        let removed = self.clients.write().remove(client_id);
        if let Some(client) = removed {
            client.close().await;
            info!(client_id = %client_id, clients = self.client_count(), "[WS Server] Client disconnected");
        }
    }

    /// Write `payload` to each client concurrently. Returns how many
    /// writes succeeded.
    async fn send_all(&self, targets: Vec<Arc<WsClient>>, payload: Utf8Bytes) -> usize {
        let timeout = self.config.write_timeout();
        let results = join_all(targets.iter().map(|client| {
            let payload = payload.clone();
            async move { (client, client.send(payload, timeout).await) }
        }))
        .await;

        let mut delivered = 0;
        for (client, result) in results {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => warn!(client_id = %client.id, error = %e, "[WS Server] Send failed"),
            }
        }
        delivered
    }

    /// Send an event frame to every client whose filter accepts the
    /// event's match. Returns how many clients received it.
    pub async fn handle_event(&self, event: &Event) -> Result<usize> {
        let targets: Vec<Arc<WsClient>> = self
            .clients
            .read()
            .values()
            .filter(|client| client.filter.read().matches(&event.match_id))
            .cloned()
            .collect();

        if targets.is_empty() {
            return Ok(0);
        }

        let payload = encode(&ServerFrame::from(event))?;
        Ok(self.send_all(targets, payload).await)
    }

    /// Send `message` to every client regardless of filters
    pub async fn broadcast(&self, message: &impl Serialize) -> Result<usize> {
        let payload = encode(message)?;
        let targets: Vec<Arc<WsClient>> = self.clients.read().values().cloned().collect();
        debug!(clients = targets.len(), "[WS Server] Broadcasting");
        Ok(self.send_all(targets, payload).await)
    }

    pub async fn send_to_client(&self, client_id: &str, message: &impl Serialize) -> Result<()> {
        let client = self
            .clients
            .read()
            .get(client_id)
            .cloned()
            .ok_or_else(|| FeedError::NotFound(format!("client {}", client_id)))?;
        let payload = encode(message)?;
        client.send(payload, self.config.write_timeout()).await
    }

    /// Close every client connection and stop all per-client loops
    pub async fn stop(&self) {
        self.token.cancel();
        let clients: Vec<Arc<WsClient>> = self.clients.write().drain().map(|(_, c)| c).collect();
        let count = clients.len();
        join_all(clients.iter().map(|client| client.close())).await;
        info!(clients = count, "[WS Server] Stopped");
    }
}

#[async_trait]
impl EventHandler for WsServer {
    async fn handle(&self, event: Arc<Event>) -> Result<()> {
        let delivered = self.handle_event(&event).await?;
        debug!(event_id = %event.id, delivered, "[WS Server] Event delivered");
        Ok(())
    }
}
