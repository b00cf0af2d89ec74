//! Canonical event model
//!
//! Every upstream feed message is normalized into an [`Event`] before it
//! enters the processing pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Kind of feed event.
///
/// Unrecognized wire values are kept as `Unknown` so the validator can
/// reject them explicitly instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    OddsChange,
    BetStop,
    BetSettlement,
    MatchStatus,
    MatchInfo,
    Score,
    Statistics,
    Unknown(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::OddsChange => "odds_change",
            EventType::BetStop => "bet_stop",
            EventType::BetSettlement => "bet_settlement",
            EventType::MatchStatus => "match_status",
            EventType::MatchInfo => "match_info",
            EventType::Score => "score",
            EventType::Statistics => "statistics",
            EventType::Unknown(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, EventType::Unknown(_))
    }
}

impl From<&str> for EventType {
    fn from(value: &str) -> Self {
        match value {
            "odds_change" => EventType::OddsChange,
            "bet_stop" => EventType::BetStop,
            "bet_settlement" => EventType::BetSettlement,
            "match_status" => EventType::MatchStatus,
            "match_info" => EventType::MatchInfo,
            "score" => EventType::Score,
            "statistics" => EventType::Statistics,
            other => EventType::Unknown(other.to_string()),
        }
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        EventType::from(value.as_str())
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        match value {
            EventType::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upstream provider an event originated from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventSource {
    Uof,
    LiveData,
    TheSports,
    Unknown(String),
}

impl EventSource {
    pub fn as_str(&self) -> &str {
        match self {
            EventSource::Uof => "uof",
            EventSource::LiveData => "livedata",
            EventSource::TheSports => "thesports",
            EventSource::Unknown(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, EventSource::Unknown(_))
    }
}

impl From<&str> for EventSource {
    fn from(value: &str) -> Self {
        match value {
            "uof" => EventSource::Uof,
            "livedata" => EventSource::LiveData,
            "thesports" => EventSource::TheSports,
            other => EventSource::Unknown(other.to_string()),
        }
    }
}

impl From<String> for EventSource {
    fn from(value: String) -> Self {
        EventSource::from(value.as_str())
    }
}

impl From<EventSource> for String {
    fn from(value: EventSource) -> Self {
        match value {
            EventSource::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized feed event.
///
/// Immutable after ingestion except for `processed_at`, which the
/// processor stamps once if it is still unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub source: EventSource,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub match_id: String,
    #[serde(default)]
    pub sport_id: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl Event {
    /// Create an event stamped with the current time
    pub fn new(
        id: impl Into<String>,
        event_type: EventType,
        source: EventSource,
        match_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            event_type,
            source,
            timestamp: Utc::now(),
            match_id: match_id.into(),
            sport_id: String::new(),
            data: Map::new(),
            raw_data: None,
            processed_at: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_sport(mut self, sport_id: impl Into<String>) -> Self {
        self.sport_id = sport_id.into();
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn with_raw(mut self, raw: Vec<u8>) -> Self {
        self.raw_data = Some(raw);
        self
    }
}
