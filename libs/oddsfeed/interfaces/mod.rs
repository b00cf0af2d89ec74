//! Interfaces Layer
//!
//! Outward-facing surfaces: the WebSocket fan-out server, health reporting
//! and the HTTP router that exposes them.

pub mod frames;
pub mod health;
pub mod http;
pub mod websocket;

pub use frames::{ClientFrame, ServerFrame, WELCOME_MESSAGE};
pub use health::{ConnectionsCheck, HealthCheck, HealthChecker, HealthReport, HealthState};
pub use http::{router, serve, AppState};
pub use websocket::{ClientInfo, WsServer, WsServerConfig};
