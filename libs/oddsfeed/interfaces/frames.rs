//! WebSocket JSON frames

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{Event, EventSource, EventType};

pub const WELCOME_MESSAGE: &str = "Connected to UOF Service WebSocket";

/// Control frames accepted from clients
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe { match_id: String },
    Unsubscribe { match_id: String },
    Ping,
}

impl ClientFrame {
    /// `None` for anything that is not a recognized control frame
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

/// Frames sent to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Welcome {
        message: String,
        client_id: String,
        time: DateTime<Utc>,
    },
    Heartbeat {
        time: DateTime<Utc>,
    },
    Pong {
        time: DateTime<Utc>,
    },
    Event {
        event_id: String,
        event_type: EventType,
        match_id: String,
        source: EventSource,
        timestamp: DateTime<Utc>,
        data: Map<String, Value>,
    },
}

impl ServerFrame {
    pub fn welcome(client_id: impl Into<String>) -> Self {
        ServerFrame::Welcome {
            message: WELCOME_MESSAGE.to_string(),
            client_id: client_id.into(),
            time: Utc::now(),
        }
    }

    pub fn heartbeat() -> Self {
        ServerFrame::Heartbeat { time: Utc::now() }
    }

    pub fn pong() -> Self {
        ServerFrame::Pong { time: Utc::now() }
    }
}

impl From<&Event> for ServerFrame {
    fn from(event: &Event) -> Self {
        ServerFrame::Event {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            match_id: event.match_id.clone(),
            source: event.source.clone(),
            timestamp: event.timestamp,
            data: event.data.clone(),
        }
    }
}
