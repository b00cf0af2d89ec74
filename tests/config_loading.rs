//! Integration test: configuration path resolution and loading

use oddsfeed_service::bin_common::{load_config_from_env, ConfigType};
use oddsfeed_service::oddsfeed::ServiceConfig;
use std::env;

#[test]
fn test_service_config_path() {
    env::remove_var("ODDSFEED_CONFIG_PATH");
    let config_path = load_config_from_env(ConfigType::Service);
    assert_eq!(config_path.to_str().unwrap(), "config/oddsfeed.yaml");

    env::set_var("ODDSFEED_CONFIG_PATH", "/etc/oddsfeed/prod.yaml");
    let config_path = load_config_from_env(ConfigType::Service);
    assert_eq!(config_path.to_str().unwrap(), "/etc/oddsfeed/prod.yaml");
    env::remove_var("ODDSFEED_CONFIG_PATH");
}

#[test]
fn test_custom_config() {
    let custom = ConfigType::Custom("custom/path.yaml".to_string());
    let config_path = load_config_from_env(custom);
    assert_eq!(config_path.to_str().unwrap(), "custom/path.yaml");
}

#[test]
fn test_shipped_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/oddsfeed.yaml");
    let config = ServiceConfig::load(path).unwrap();

    assert_eq!(config.websocket.heartbeat_interval_secs, 30);
    assert!(config.health_check.enabled);
    assert!(config.validate().is_ok());
}
