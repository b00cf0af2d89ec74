//! Feed service facade
//!
//! Wires storage, processing, ingestion, subscriptions and the WebSocket
//! server into one runnable unit.

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::business::SubscriptionService;
use crate::domain::EventFilter;
use crate::infrastructure::ServiceConfig;
use crate::ingestion::{
    spawn_event_pump, ChannelSource, ConnectionManager, EventDataSource, RecoveryEngine,
    RecoveryManager, SourceType,
};
use crate::interfaces::{serve, AppState, ConnectionsCheck, HealthChecker, WsServer};
use crate::processing::{
    DataStorage, EventDispatcher, EventProcessor, EventValidator, ProcessingPipeline, Subscriber,
};

pub const PRIMARY_SOURCE: &str = "uof";
const ACTIVITY_SUBSCRIBER_ID: &str = "subscription-activity";

pub struct FeedService {
    pub config: ServiceConfig,
    pub storage: Arc<dyn DataStorage>,
    pub dispatcher: Arc<EventDispatcher>,
    pub pipeline: Arc<ProcessingPipeline>,
    pub source: Arc<ChannelSource>,
    pub connections: Arc<ConnectionManager>,
    pub subscriptions: Arc<SubscriptionService>,
    pub ws: Arc<WsServer>,
    pub health: Arc<HealthChecker>,
    pub recovery: Option<Arc<RecoveryManager>>,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl FeedService {
    pub fn new(config: ServiceConfig, storage: Arc<dyn DataStorage>) -> Self {
        let dispatcher = Arc::new(EventDispatcher::new(config.dispatcher.clone()));

        let pipeline = Arc::new(ProcessingPipeline::new(Some(Arc::clone(&dispatcher))));
        pipeline.add_processor(Arc::new(
            EventProcessor::new("events", Arc::clone(&storage))
                .with_validator(Arc::new(EventValidator::new())),
        ));

        let source = Arc::new(ChannelSource::new(PRIMARY_SOURCE, SourceType::Uof));
        let connections = Arc::new(ConnectionManager::new(config.health_check.clone()));

        let feed: Arc<dyn EventDataSource> = source.clone();
        let subscriptions = Arc::new(SubscriptionService::new(feed));
        dispatcher.subscribe(Subscriber::new(
            ACTIVITY_SUBSCRIBER_ID,
            EventFilter::all(),
            subscriptions.activity_handler(),
        ));

        let ws = Arc::new(WsServer::new(config.websocket.clone()));
        ws.attach(&dispatcher);

        let health = Arc::new(HealthChecker::default());
        health.register_check("connections", Arc::new(ConnectionsCheck::new(Arc::clone(&connections))));

        Self {
            config,
            storage,
            dispatcher,
            pipeline,
            source,
            connections,
            subscriptions,
            ws,
            health,
            recovery: None,
            tasks: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn with_recovery_engine(mut self, engine: Arc<dyn RecoveryEngine>) -> Self {
        let cooldown = Duration::from_secs(self.config.recovery.cooldown_secs);
        self.recovery = Some(Arc::new(RecoveryManager::with_cooldown(engine, cooldown)));
        self
    }

    fn app_state(&self) -> AppState {
        AppState {
            ws: Arc::clone(&self.ws),
            health: Arc::clone(&self.health),
            connections: Arc::clone(&self.connections),
            subscriptions: Arc::clone(&self.subscriptions),
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }

    /// Connect sources and start every background task. Returns the
    /// address the HTTP server is bound to.
    pub async fn start(&self, listener: TcpListener, token: &CancellationToken) -> anyhow::Result<SocketAddr> {
        let addr = listener.local_addr().context("listener has no local address")?;

        self.connections
            .register_source(PRIMARY_SOURCE, self.source.clone())
            .context("registering primary source")?;
        self.connections
            .connect_all(token)
            .await
            .context("connecting data sources")?;

        let events = self
            .source
            .take_event_channel()
            .context("event channel already taken")?;

        let mut tasks = Vec::new();
        tasks.push(spawn_event_pump(
            PRIMARY_SOURCE,
            events,
            Arc::clone(&self.pipeline),
            token.child_token(),
        ));

        let cleanup = &self.config.subscriptions;
        tasks.push(self.subscriptions.spawn_cleanup_loop(
            Duration::from_secs(cleanup.cleanup_interval_secs),
            Duration::from_secs(cleanup.inactive_after_secs),
            token.child_token(),
        ));

        let state = self.app_state();
        let server_token = token.child_token();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = serve(listener, state, server_token).await {
                warn!(error = %e, "[Feed Service] HTTP server failed");
            }
        }));

        self.tasks.lock().extend(tasks);
        info!(%addr, "[Feed Service] Started");
        Ok(addr)
    }

    /// Stop the WebSocket server, disconnect sources and wait for the
    /// background tasks. `token` must already be cancelled.
    pub async fn shutdown(&self) {
        self.ws.stop().await;

        if let Err(e) = self.connections.disconnect_all().await {
            warn!(error = %e, "[Feed Service] Disconnect failed");
        }

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "[Feed Service] Task ended abnormally");
            }
        }
        info!("[Feed Service] Stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FeedError, Result};
    use crate::ingestion::{RecoveryRequest, RecoveryState};
    use crate::processing::InMemoryStorage;
    use async_trait::async_trait;

    struct AcceptAll;

    #[async_trait]
    impl RecoveryEngine for AcceptAll {
        async fn trigger_full_recovery(&self, _request: &RecoveryRequest) -> Result<()> {
            Ok(())
        }

        async fn trigger_event_recovery(&self, _event_id: &str, _request: &RecoveryRequest) -> Result<()> {
            Ok(())
        }

        async fn trigger_stateful_recovery(&self, _request: &RecoveryRequest) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_wiring() {
        let service = FeedService::new(ServiceConfig::default(), Arc::new(InMemoryStorage::new()));
        assert_eq!(service.pipeline.processor_names(), vec!["events".to_string()]);
        // activity tracking and the websocket server
        assert_eq!(service.dispatcher.subscriber_count(), 2);
        assert_eq!(service.health.check_names(), vec!["connections".to_string()]);
        assert!(service.recovery.is_none());
    }

    #[tokio::test]
    async fn test_recovery_uses_configured_cooldown() {
        let mut config = ServiceConfig::default();
        config.recovery.cooldown_secs = 3600;
        let service = FeedService::new(config, Arc::new(InMemoryStorage::new()))
            .with_recovery_engine(Arc::new(AcceptAll));

        let recovery = service.recovery.clone().unwrap();
        let request = RecoveryRequest::full(PRIMARY_SOURCE);
        recovery.trigger_recovery(&request).await.unwrap();
        assert_eq!(recovery.get_recovery_status(PRIMARY_SOURCE).status, RecoveryState::Completed);

        let err = recovery.trigger_recovery(&request).await.unwrap_err();
        assert!(matches!(err, FeedError::RateLimitExceeded(_)));
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let service = FeedService::new(ServiceConfig::default(), Arc::new(InMemoryStorage::new()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let token = CancellationToken::new();

        service.start(listener, &token).await.unwrap();
        assert!(service.connections.get_connection_status()[PRIMARY_SOURCE].connected);

        token.cancel();
        service.shutdown().await;
        assert!(!service.connections.get_connection_status()[PRIMARY_SOURCE].connected);
    }
}
