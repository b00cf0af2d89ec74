//! Odds Feed Core
//!
//! Real-time ingestion, validation, persistence handoff and fan-out of
//! sports odds-feed events, together with upstream subscription and
//! connection lifecycle management.
//!
//! ## Layers
//!
//! - **domain**: canonical models, filters and the error taxonomy
//! - **processing**: validators, processors, pipeline, dispatcher, storage contract
//! - **ingestion**: data sources, connection health, recovery, event pump
//! - **business**: per-match upstream subscription tracking
//! - **interfaces**: WebSocket fan-out server and health reporting
//! - **infrastructure**: configuration, logging, shutdown
//! - **application**: the wired-up feed service

pub mod application;
pub mod business;
pub mod domain;
pub mod infrastructure;
pub mod ingestion;
pub mod interfaces;
pub mod processing;
pub mod utils;

pub use application::FeedService;
pub use domain::{Event, EventFilter, EventSource, EventType, FeedError, Result};
pub use infrastructure::{init_tracing, init_tracing_with_level, ServiceConfig, ShutdownManager};
pub use processing::{EventDispatcher, ProcessingPipeline};
