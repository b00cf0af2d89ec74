//! HTTP surface: WebSocket upgrade, health and status endpoints

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::health::HealthChecker;
use super::websocket::{ClientInfo, WsServer};
use crate::business::{SubscriptionService, SubscriptionStats};
use crate::ingestion::{ConnectionManager, ConnectionStatus};
use crate::processing::EventDispatcher;

#[derive(Clone)]
pub struct AppState {
    pub ws: Arc<WsServer>,
    pub health: Arc<HealthChecker>,
    pub connections: Arc<ConnectionManager>,
    pub subscriptions: Arc<SubscriptionService>,
    pub dispatcher: Arc<EventDispatcher>,
}

#[derive(Debug, Serialize)]
struct DispatcherStatus {
    subscribers: usize,
    in_flight: usize,
    dropped_deliveries: u64,
}

#[derive(Debug, Serialize)]
struct ServiceStatus {
    connections: HashMap<String, ConnectionStatus>,
    subscriptions: SubscriptionStats,
    websocket_clients: Vec<ClientInfo>,
    dispatcher: DispatcherStatus,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let server = Arc::clone(&state.ws);
    ws.on_upgrade(move |socket| server.handle_socket(socket))
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let report = state.health.check().await;
    let code = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report)).into_response()
}

async fn status_handler(State(state): State<AppState>) -> Json<ServiceStatus> {
    Json(ServiceStatus {
        connections: state.connections.get_connection_status(),
        subscriptions: state.subscriptions.get_subscription_stats().await,
        websocket_clients: state.ws.clients(),
        dispatcher: DispatcherStatus {
            subscribers: state.dispatcher.subscriber_count(),
            in_flight: state.dispatcher.in_flight(),
            dropped_deliveries: state.dispatcher.dropped_deliveries(),
        },
    })
}

/// Serve the router on `listener` until `token` is cancelled. Open
/// WebSocket clients are closed before returning.
pub async fn serve(listener: TcpListener, state: AppState, token: CancellationToken) -> std::io::Result<()> {
    let ws = Arc::clone(&state.ws);
    let addr = listener.local_addr()?;
    info!(%addr, "[HTTP] Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            token.cancelled().await;
            ws.stop().await;
        })
        .await?;

    info!("[HTTP] Server stopped");
    Ok(())
}
