use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::event::EventSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OddsStatus {
    Active,
    Suspended,
    Deactivated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub id: String,
    pub name: String,
    /// Decimal price
    pub odds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Odds {
    pub id: String,
    pub match_id: String,
    pub market_id: String,
    #[serde(default)]
    pub market_name: String,
    pub outcomes: Vec<Outcome>,
    pub status: OddsStatus,
    pub source: EventSource,
    pub timestamp: DateTime<Utc>,
}

impl Odds {
    pub fn active_outcomes(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| o.active)
    }
}

/// Market definition, e.g. 1x2 or total goals with a `total` specifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub specifiers: HashMap<String, String>,
}
