//! Named health checks with an aggregate report

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::ingestion::ConnectionManager;

#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// `Ok` carries a short status message
    async fn check(&self) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub status: HealthState,
    pub message: String,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthState,
    pub checks: BTreeMap<String, CheckResult>,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthState::Healthy
    }
}

pub struct HealthChecker {
    checks: RwLock<BTreeMap<String, Arc<dyn HealthCheck>>>,
    timeout: Duration,
}

impl HealthChecker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            checks: RwLock::new(BTreeMap::new()),
            timeout,
        }
    }

    pub fn register_check(&self, name: impl Into<String>, check: Arc<dyn HealthCheck>) {
        let name = name.into();
        info!(check = %name, "[Health] Check registered");
        self.checks.write().insert(name, check);
    }

    pub fn unregister_check(&self, name: &str) -> bool {
        self.checks.write().remove(name).is_some()
    }

    pub fn check_names(&self) -> Vec<String> {
        self.checks.read().keys().cloned().collect()
    }

    /// Run every check. Overall status is healthy iff every check is.
    pub async fn check(&self) -> HealthReport {
        let checks: Vec<(String, Arc<dyn HealthCheck>)> = self
            .checks
            .read()
            .iter()
            .map(|(name, check)| (name.clone(), Arc::clone(check)))
            .collect();

        let mut results = BTreeMap::new();
        for (name, check) in checks {
            let started = Instant::now();
            let outcome = match tokio::time::timeout(self.timeout, check.check()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(anyhow::anyhow!("check timed out after {:?}", self.timeout)),
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            let result = match outcome {
                Ok(message) => CheckResult {
                    status: HealthState::Healthy,
                    message,
                    latency_ms,
                },
                Err(e) => {
                    warn!(check = %name, error = %e, "[Health] Check failed");
                    CheckResult {
                        status: HealthState::Unhealthy,
                        message: e.to_string(),
                        latency_ms,
                    }
                }
            };
            results.insert(name, result);
        }

        let status = if results.values().all(|r| r.status == HealthState::Healthy) {
            HealthState::Healthy
        } else {
            HealthState::Unhealthy
        };

        HealthReport {
            status,
            checks: results,
            timestamp: Utc::now(),
        }
    }

    pub async fn is_healthy(&self) -> bool {
        self.check().await.is_healthy()
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

/// Healthy iff every registered data source is connected
pub struct ConnectionsCheck {
    manager: Arc<ConnectionManager>,
}

impl ConnectionsCheck {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl HealthCheck for ConnectionsCheck {
    async fn check(&self) -> anyhow::Result<String> {
        let statuses = self.manager.get_connection_status();
        let mut disconnected: Vec<&str> = statuses
            .values()
            .filter(|s| !s.connected)
            .map(|s| s.name.as_str())
            .collect();

        if disconnected.is_empty() {
            return Ok(format!("{} sources connected", statuses.len()));
        }
        disconnected.sort_unstable();
        anyhow::bail!("disconnected sources: {}", disconnected.join(", "))
    }
}
