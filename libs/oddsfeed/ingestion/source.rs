//! Upstream data source contract

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

use crate::domain::{Event, EventType, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Uof,
    LiveData,
    TheSports,
    Mts,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Uof => "uof",
            SourceType::LiveData => "livedata",
            SourceType::TheSports => "thesports",
            SourceType::Mts => "mts",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upstream subscription filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceFilter {
    pub event_types: Vec<EventType>,
    pub match_ids: Vec<String>,
    pub sport_ids: Vec<String>,
}

impl SourceFilter {
    pub fn for_match(match_id: impl Into<String>) -> Self {
        Self {
            match_ids: vec![match_id.into()],
            ..Default::default()
        }
    }
}

/// A named upstream connection.
///
/// `connect` on a connected source fails with `AlreadyConnected`;
/// operations that need a live connection fail with `NotConnected`.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    fn name(&self) -> &str;

    fn source_type(&self) -> SourceType;
}

/// A source that delivers canonical events and accepts per-filter
/// subscriptions.
#[async_trait]
pub trait EventDataSource: DataSource {
    async fn subscribe(&self, filter: &SourceFilter) -> Result<()>;

    async fn unsubscribe(&self, filter: &SourceFilter) -> Result<()>;

    /// Hand out the receiving end of the event channel. Only the first
    /// call returns `Some`.
    fn take_event_channel(&self) -> Option<mpsc::Receiver<Event>>;
}
