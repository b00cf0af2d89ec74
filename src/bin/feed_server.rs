use anyhow::{Context, Result};
use oddsfeed::infrastructure::ConfigError;
use oddsfeed::processing::InMemoryStorage;
use oddsfeed::utils::spawn_ticker;
use oddsfeed::{init_tracing_with_level, FeedService, ServiceConfig, ShutdownManager};
use oddsfeed_service::bin_common::{load_config_from_env, BinaryRunner, ConfigType, RunConfig};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

struct FeedServer {
    run_config: RunConfig,
    service: Arc<FeedService>,
    shutdown: ShutdownManager,
}

impl BinaryRunner for FeedServer {
    async fn run(&mut self) -> Result<Option<String>> {
        let bind_addr = self.service.config.websocket.bind_addr.clone();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("binding {}", bind_addr))?;

        let token = self.shutdown.token();
        self.service.start(listener, &token).await?;

        let service = Arc::clone(&self.service);
        let status = spawn_ticker(
            "status",
            Duration::from_secs(self.run_config.status_interval_secs),
            token.child_token(),
            move || {
                let service = Arc::clone(&service);
                async move {
                    let stats = service.subscriptions.get_subscription_stats().await;
                    info!(
                        clients = service.ws.client_count(),
                        subscriptions = stats.total_subscriptions,
                        events = stats.total_events,
                        dropped = service.dispatcher.dropped_deliveries(),
                        "Heartbeat"
                    );
                    ControlFlow::Continue(())
                }
            },
        );

        self.shutdown.wait().await;

        self.service.shutdown().await;
        if let Err(e) = status.await {
            warn!(error = %e, "Status task ended abnormally");
        }

        let stats = self.service.subscriptions.get_subscription_stats().await;
        Ok(Some(format!(
            "{} subscriptions, {} events delivered to tracked matches",
            stats.total_subscriptions, stats.total_events
        )))
    }

    fn config(&self) -> &RunConfig {
        &self.run_config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Load config first (before logging is initialized)
    let config_path = load_config_from_env(ConfigType::Service);
    let (config, used_defaults) = match ServiceConfig::load(&config_path) {
        Ok(config) => (config, false),
        Err(ConfigError::FileError(_)) => (ServiceConfig::from_yaml("{}")?, true),
        Err(e) => return Err(e).with_context(|| format!("loading {}", config_path.display())),
    };

    init_tracing_with_level(&config.log_level);
    if used_defaults {
        warn!("Config file {} not found, using defaults", config_path.display());
    }
    config.log();

    let shutdown = ShutdownManager::new();
    shutdown.spawn_signal_handler();

    let service = FeedService::new(config, Arc::new(InMemoryStorage::new()));
    let mut server = FeedServer {
        run_config: RunConfig::new("Odds Feed Server"),
        service: Arc::new(service),
        shutdown,
    };

    server.execute().await
}
