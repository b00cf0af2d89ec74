//! Event filters
//!
//! [`EventFilter`] is the dispatcher-side filter: four optional allow-sets,
//! where an empty set is a wildcard. [`MatchFilter`] is the per-client
//! WebSocket filter and makes the "receive everything" case explicit.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::event::{Event, EventSource, EventType};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    #[serde(default)]
    pub event_types: Vec<EventType>,
    #[serde(default)]
    pub match_ids: Vec<String>,
    #[serde(default)]
    pub sport_ids: Vec<String>,
    #[serde(default)]
    pub sources: Vec<EventSource>,
}

impl EventFilter {
    /// Filter that accepts every event
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_event_type(mut self, event_type: EventType) -> Self {
        self.event_types.push(event_type);
        self
    }

    pub fn with_match(mut self, match_id: impl Into<String>) -> Self {
        self.match_ids.push(match_id.into());
        self
    }

    pub fn with_sport(mut self, sport_id: impl Into<String>) -> Self {
        self.sport_ids.push(sport_id.into());
        self
    }

    pub fn with_source(mut self, source: EventSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn is_wildcard(&self) -> bool {
        self.event_types.is_empty()
            && self.match_ids.is_empty()
            && self.sport_ids.is_empty()
            && self.sources.is_empty()
    }

    /// Every non-empty field must contain the event's value
    pub fn matches(&self, event: &Event) -> bool {
        (self.event_types.is_empty() || self.event_types.contains(&event.event_type))
            && (self.match_ids.is_empty() || self.match_ids.contains(&event.match_id))
            && (self.sport_ids.is_empty() || self.sport_ids.contains(&event.sport_id))
            && (self.sources.is_empty() || self.sources.contains(&event.source))
    }
}

/// Per-client match filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchFilter {
    /// Receive every event
    All,
    /// Receive only events for the listed matches
    Subset(BTreeSet<String>),
}

impl Default for MatchFilter {
    fn default() -> Self {
        MatchFilter::All
    }
}

impl MatchFilter {
    pub fn matches(&self, match_id: &str) -> bool {
        match self {
            MatchFilter::All => true,
            MatchFilter::Subset(ids) => ids.contains(match_id),
        }
    }

    /// Narrow the filter to include `match_id`. Subscribing from `All`
    /// starts a subset containing only that match.
    pub fn subscribe(&mut self, match_id: impl Into<String>) {
        match self {
            MatchFilter::All => {
                let mut ids = BTreeSet::new();
                ids.insert(match_id.into());
                *self = MatchFilter::Subset(ids);
            }
            MatchFilter::Subset(ids) => {
                ids.insert(match_id.into());
            }
        }
    }

    /// Remove `match_id` from the subset. Removing the last entry returns
    /// the filter to `All`.
    pub fn unsubscribe(&mut self, match_id: &str) {
        if let MatchFilter::Subset(ids) = self {
            ids.remove(match_id);
            if ids.is_empty() {
                *self = MatchFilter::All;
            }
        }
    }

    pub fn match_ids(&self) -> Vec<String> {
        match self {
            MatchFilter::All => Vec::new(),
            MatchFilter::Subset(ids) => ids.iter().cloned().collect(),
        }
    }
}
