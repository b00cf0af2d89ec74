use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::ingestion::HealthCheckConfig;
use crate::interfaces::WsServerConfig;
use crate::processing::DispatcherConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

const VALID_LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Odds feed service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub websocket: WsServerConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub subscriptions: SubscriptionConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// How often inactive subscriptions are swept
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Subscriptions with no event for this long are retired
    #[serde(default = "default_inactive_after_secs")]
    pub inactive_after_secs: u64,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: default_cleanup_interval_secs(),
            inactive_after_secs: default_inactive_after_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

fn default_inactive_after_secs() -> u64 {
    2 * 60 * 60
}

fn default_cooldown_secs() -> u64 {
    60
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            websocket: WsServerConfig::default(),
            dispatcher: DispatcherConfig::default(),
            health_check: HealthCheckConfig::default(),
            subscriptions: SubscriptionConfig::default(),
            recovery: RecoveryConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from YAML file
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        Self::from_yaml(&yaml_content)
    }

    /// Parse, apply environment overrides and validate
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut config: ServiceConfig = serde_yaml::from_str(yaml)?;

        if let Ok(bind_addr) = std::env::var("ODDSFEED_BIND_ADDR") {
            info!("Overriding bind address from environment variable");
            config.websocket.bind_addr = bind_addr;
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        if self.websocket.bind_addr.is_empty() {
            return Err(ConfigError::ValidationError(
                "websocket.bind_addr must not be empty".to_string(),
            ));
        }

        if self.websocket.heartbeat_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "websocket.heartbeat_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.websocket.write_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "websocket.write_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.dispatcher.max_in_flight == 0 {
            return Err(ConfigError::ValidationError(
                "dispatcher.max_in_flight must be greater than 0".to_string(),
            ));
        }

        if self.health_check.interval_secs == 0 || self.health_check.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "health_check interval and timeout must be greater than 0".to_string(),
            ));
        }

        if self.subscriptions.cleanup_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "subscriptions.cleanup_interval_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration loaded:");
        info!("  Log level: {}", self.log_level);
        info!("  Bind address: {}", self.websocket.bind_addr);
        info!("  Heartbeat interval: {}s", self.websocket.heartbeat_interval_secs);
        info!(
            "  Dispatcher: max {} in flight, overflow {:?}",
            self.dispatcher.max_in_flight, self.dispatcher.overflow
        );
        info!(
            "  Health check: enabled={} interval={}s timeout={}s",
            self.health_check.enabled, self.health_check.interval_secs, self.health_check.timeout_secs
        );
        info!(
            "  Subscription cleanup: every {}s, inactive after {}s",
            self.subscriptions.cleanup_interval_secs, self.subscriptions.inactive_after_secs
        );
        info!("  Recovery cooldown: {}s", self.recovery.cooldown_secs);
    }
}
