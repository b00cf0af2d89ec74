//! Source health detection and remediation
//!
//! Detection ([`HealthDetector`]) and remediation ([`ReconnectPolicy`]) are
//! separate seams. The connection manager probes with the detector and
//! asks the policy what to do about a failing source.

use async_trait::async_trait;

use super::source::DataSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceHealth {
    Healthy,
    Unhealthy(String),
}

impl SourceHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, SourceHealth::Healthy)
    }
}

#[async_trait]
pub trait HealthDetector: Send + Sync {
    async fn probe(&self, source: &dyn DataSource) -> SourceHealth;
}

/// Healthy iff the source reports itself connected
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectednessDetector;

#[async_trait]
impl HealthDetector for ConnectednessDetector {
    async fn probe(&self, source: &dyn DataSource) -> SourceHealth {
        if source.is_connected() {
            SourceHealth::Healthy
        } else {
            SourceHealth::Unhealthy("disconnected".to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remediation {
    /// Log only
    None,
    /// Call `connect` on the source
    Reconnect,
}

/// Decides what to do about a source that failed its health probe
pub trait ReconnectPolicy: Send + Sync {
    /// `consecutive_failures` is 1 for the first failed probe in a row
    fn decide(&self, source_name: &str, consecutive_failures: usize) -> Remediation;
}

/// Observe only. Failing sources are logged and left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverReconnect;

impl ReconnectPolicy for NeverReconnect {
    fn decide(&self, _source_name: &str, _consecutive_failures: usize) -> Remediation {
        Remediation::None
    }
}

/// Reconnect on every failed probe, up to `max_attempts` in a row
#[derive(Debug, Clone, Copy)]
pub struct ReconnectOnFailure {
    max_attempts: Option<usize>,
}

impl ReconnectOnFailure {
    /// `None` = unlimited attempts
    pub fn new(max_attempts: Option<usize>) -> Self {
        Self { max_attempts }
    }
}

impl ReconnectPolicy for ReconnectOnFailure {
    fn decide(&self, _source_name: &str, consecutive_failures: usize) -> Remediation {
        if self.max_attempts.map_or(true, |max| consecutive_failures <= max) {
            Remediation::Reconnect
        } else {
            Remediation::None
        }
    }
}
