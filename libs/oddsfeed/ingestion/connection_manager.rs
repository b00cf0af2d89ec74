//! Named data source registry with connect/disconnect fan-out and a
//! periodic health check.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::health::{
    ConnectednessDetector, HealthDetector, NeverReconnect, ReconnectPolicy, Remediation,
    SourceHealth,
};
use super::source::{DataSource, SourceType};
use crate::domain::{FeedError, Result};
use crate::utils::spawn_ticker;

type SourceMap = RwLock<HashMap<String, Arc<dyn DataSource>>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    30
}

fn default_timeout_secs() -> u64 {
    5
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Snapshot of one source, computed on request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub name: String,
    pub source_type: SourceType,
    pub connected: bool,
    pub last_check: DateTime<Utc>,
}

pub struct ConnectionManager {
    sources: Arc<SourceMap>,
    health_config: RwLock<HealthCheckConfig>,
    detector: Arc<dyn HealthDetector>,
    policy: Arc<dyn ReconnectPolicy>,
    failures: Arc<Mutex<HashMap<String, usize>>>,
    health_loop: Mutex<Option<CancellationToken>>,
}

impl ConnectionManager {
    pub fn new(health_config: HealthCheckConfig) -> Self {
        Self {
            sources: Arc::new(RwLock::new(HashMap::new())),
            health_config: RwLock::new(health_config),
            detector: Arc::new(ConnectednessDetector),
            policy: Arc::new(NeverReconnect),
            failures: Arc::new(Mutex::new(HashMap::new())),
            health_loop: Mutex::new(None),
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn HealthDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_reconnect_policy(mut self, policy: Arc<dyn ReconnectPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn register_source(&self, name: impl Into<String>, source: Arc<dyn DataSource>) -> Result<()> {
        let name = name.into();
        let mut sources = self.sources.write();
        if sources.contains_key(&name) {
            return Err(FeedError::AlreadyExists(format!("source {} already registered", name)));
        }
        info!(source = %name, source_type = %source.source_type(), "[Connection Manager] Source registered");
        sources.insert(name, source);
        Ok(())
    }

    /// Remove a source, disconnecting it first if it is connected.
    /// A failed disconnect is logged and the source is removed anyway.
    pub async fn unregister_source(&self, name: &str) -> Result<()> {
        let source = self.get_source(name)?;

        if source.is_connected() {
            if let Err(e) = source.disconnect().await {
                warn!(source = %name, error = %e, "[Connection Manager] Disconnect during unregister failed");
            }
        }

        self.sources.write().remove(name);
        self.failures.lock().remove(name);
        info!(source = %name, "[Connection Manager] Source unregistered");
        Ok(())
    }

    pub fn get_source(&self, name: &str) -> Result<Arc<dyn DataSource>> {
        self.sources
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| FeedError::NotFound(format!("source {}", name)))
    }

    pub fn source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn snapshot(&self) -> Vec<(String, Arc<dyn DataSource>)> {
        self.sources
            .read()
            .iter()
            .map(|(name, source)| (name.clone(), Arc::clone(source)))
            .collect()
    }

    /// Connect every registered source.
    ///
    /// Failures are counted into one `PartialFailure`; sources that did
    /// connect stay connected. The health-check loop starts only when
    /// every source connected, and stops when `token` is cancelled.
    pub async fn connect_all(&self, token: &CancellationToken) -> Result<()> {
        let mut failed = 0;

        for (name, source) in self.snapshot() {
            match source.connect().await {
                Ok(()) => info!(source = %name, "[Connection Manager] Connected"),
                Err(FeedError::AlreadyConnected(_)) => {
                    debug!(source = %name, "[Connection Manager] Already connected")
                }
                Err(e) => {
                    warn!(source = %name, error = %e, "[Connection Manager] Connect failed");
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            return Err(FeedError::PartialFailure {
                action: "connect".to_string(),
                failed,
            });
        }

        if self.health_config.read().enabled {
            self.start_health_check(token.child_token());
        }
        Ok(())
    }

    /// Disconnect every registered source and stop the health-check loop
    pub async fn disconnect_all(&self) -> Result<()> {
        self.stop_health_check();

        let mut failed = 0;
        for (name, source) in self.snapshot() {
            match source.disconnect().await {
                Ok(()) => info!(source = %name, "[Connection Manager] Disconnected"),
                Err(FeedError::NotConnected(_)) => {
                    debug!(source = %name, "[Connection Manager] Already disconnected")
                }
                Err(e) => {
                    warn!(source = %name, error = %e, "[Connection Manager] Disconnect failed");
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            return Err(FeedError::PartialFailure {
                action: "disconnect".to_string(),
                failed,
            });
        }
        Ok(())
    }

    pub fn get_connection_status(&self) -> HashMap<String, ConnectionStatus> {
        let now = Utc::now();
        self.sources
            .read()
            .iter()
            .map(|(name, source)| {
                (
                    name.clone(),
                    ConnectionStatus {
                        name: name.clone(),
                        source_type: source.source_type(),
                        connected: source.is_connected(),
                        last_check: now,
                    },
                )
            })
            .collect()
    }

    /// Takes effect the next time the health loop is started
    pub fn set_health_check_config(&self, config: HealthCheckConfig) {
        *self.health_config.write() = config;
    }

    pub fn health_check_config(&self) -> HealthCheckConfig {
        self.health_config.read().clone()
    }

    pub fn is_health_check_running(&self) -> bool {
        self.health_loop
            .lock()
            .as_ref()
            .map_or(false, |token| !token.is_cancelled())
    }

    /// Run one health pass over every source
    pub async fn check_health(&self) -> HashMap<String, SourceHealth> {
        let timeout = self.health_config.read().timeout();
        health_pass(
            &self.sources,
            self.detector.as_ref(),
            self.policy.as_ref(),
            timeout,
            &self.failures,
        )
        .await
    }

    fn start_health_check(&self, token: CancellationToken) {
        let config = self.health_config.read().clone();

        if let Some(previous) = self.health_loop.lock().replace(token.clone()) {
            previous.cancel();
        }

        info!(
            interval_secs = config.interval_secs,
            timeout_secs = config.timeout_secs,
            "[Connection Manager] Health check started"
        );

        let sources = Arc::clone(&self.sources);
        let detector = Arc::clone(&self.detector);
        let policy = Arc::clone(&self.policy);
        let failures = Arc::clone(&self.failures);
        let timeout = config.timeout();

        spawn_ticker("health-check", config.interval(), token, move || {
            let sources = Arc::clone(&sources);
            let detector = Arc::clone(&detector);
            let policy = Arc::clone(&policy);
            let failures = Arc::clone(&failures);
            async move {
                health_pass(&sources, detector.as_ref(), policy.as_ref(), timeout, &failures).await;
                ControlFlow::Continue(())
            }
        });
    }

    fn stop_health_check(&self) {
        if let Some(token) = self.health_loop.lock().take() {
            token.cancel();
            info!("[Connection Manager] Health check stopped");
        }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(HealthCheckConfig::default())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(token) = self.health_loop.get_mut().take() {
            token.cancel();
        }
    }
}

async fn health_pass(
    sources: &SourceMap,
    detector: &dyn HealthDetector,
    policy: &dyn ReconnectPolicy,
    timeout: Duration,
    failures: &Mutex<HashMap<String, usize>>,
) -> HashMap<String, SourceHealth> {
    let snapshot: Vec<(String, Arc<dyn DataSource>)> = sources
        .read()
        .iter()
        .map(|(name, source)| (name.clone(), Arc::clone(source)))
        .collect();

    let mut results = HashMap::with_capacity(snapshot.len());

    for (name, source) in snapshot {
        let health = match tokio::time::timeout(timeout, detector.probe(source.as_ref())).await {
            Ok(health) => health,
            Err(_) => SourceHealth::Unhealthy(format!("health probe timed out after {:?}", timeout)),
        };

        match &health {
            SourceHealth::Healthy => {
                failures.lock().remove(&name);
            }
            SourceHealth::Unhealthy(reason) => {
                let consecutive = {
                    let mut failures = failures.lock();
                    let count = failures.entry(name.clone()).or_insert(0);
                    *count += 1;
                    *count
                };
                warn!(
                    source = %name,
                    reason = %reason,
                    consecutive_failures = consecutive,
                    "[Connection Manager] Source is unhealthy"
                );

                if policy.decide(&name, consecutive) == Remediation::Reconnect {
                    match source.connect().await {
                        Ok(()) => info!(source = %name, "[Connection Manager] Reconnected"),
                        Err(e) => warn!(source = %name, error = %e, "[Connection Manager] Reconnect failed"),
                    }
                }
            }
        }

        results.insert(name, health);
    }

    results
}
