//! CLI utilities for binaries
//!
//! Resolves configuration file paths from the environment.

use std::path::PathBuf;

/// Type of configuration to load
#[derive(Debug, Clone)]
pub enum ConfigType {
    /// Feed service configuration (config/oddsfeed.yaml)
    Service,
    /// Custom path
    Custom(String),
}

impl ConfigType {
    /// Default path for this config type
    pub fn default_path(&self) -> &str {
        match self {
            ConfigType::Service => "config/oddsfeed.yaml",
            ConfigType::Custom(path) => path,
        }
    }

    /// Environment variable that overrides the path, if any
    pub fn env_var_name(&self) -> Option<&str> {
        match self {
            ConfigType::Service => Some("ODDSFEED_CONFIG_PATH"),
            ConfigType::Custom(_) => None,
        }
    }
}

/// Configuration path from the environment, falling back to the default
///
/// ```
/// use oddsfeed_service::bin_common::{load_config_from_env, ConfigType};
///
/// let path = load_config_from_env(ConfigType::Custom("feed.yaml".to_string()));
/// assert_eq!(path.to_str(), Some("feed.yaml"));
/// ```
pub fn load_config_from_env(config_type: ConfigType) -> PathBuf {
    config_type
        .env_var_name()
        .and_then(|name| std::env::var(name).ok())
        .unwrap_or_else(|| config_type.default_path().to_string())
        .into()
}

/// Command line arguments, excluding the program name
pub fn parse_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}
