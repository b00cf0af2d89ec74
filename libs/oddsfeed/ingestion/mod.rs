//! Ingestion Layer
//!
//! Upstream data sources, their connection lifecycle and health, throttled
//! recovery, and the bridge from a source's event channel into the
//! processing pipeline.

pub mod channel_source;
pub mod connection_manager;
pub mod health;
pub mod pump;
pub mod recovery;
pub mod source;

pub use channel_source::ChannelSource;
pub use connection_manager::{ConnectionManager, ConnectionStatus, HealthCheckConfig};
pub use health::{
    ConnectednessDetector, HealthDetector, NeverReconnect, ReconnectOnFailure, ReconnectPolicy,
    Remediation, SourceHealth,
};
pub use pump::spawn_event_pump;
pub use recovery::{
    RecoveryEngine, RecoveryKind, RecoveryManager, RecoveryRequest, RecoveryState, RecoveryStatus,
};
pub use source::{DataSource, EventDataSource, SourceFilter, SourceType};
