//! Application Layer
//!
//! Composition of the layers below into a runnable feed service.

pub mod service;

pub use service::{FeedService, PRIMARY_SOURCE};
