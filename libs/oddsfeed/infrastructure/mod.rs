//! Infrastructure Layer
//!
//! Configuration, logging and process lifecycle.

pub mod config;
pub mod logging;
pub mod shutdown;

pub use config::{ConfigError, RecoveryConfig, ServiceConfig, SubscriptionConfig};
pub use logging::{init_tracing, init_tracing_with_level};
pub use shutdown::ShutdownManager;
