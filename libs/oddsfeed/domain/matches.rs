use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::EventSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    NotStarted,
    Live,
    Ended,
    Closed,
    Cancelled,
    Postponed,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::NotStarted => "not_started",
            MatchStatus::Live => "live",
            MatchStatus::Ended => "ended",
            MatchStatus::Closed => "closed",
            MatchStatus::Cancelled => "cancelled",
            MatchStatus::Postponed => "postponed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub home: u32,
    pub away: u32,
}

/// In-play statistics, each side reported as (home, away)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub possession: Option<(f64, f64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shots: Option<(u32, u32)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shots_on_target: Option<(u32, u32)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corners: Option<(u32, u32)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yellow_cards: Option<(u32, u32)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub red_cards: Option<(u32, u32)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub sport_id: String,
    #[serde(default)]
    pub sport_name: String,
    pub home_team: Team,
    pub away_team: Team,
    pub status: MatchStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Score>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Statistics>,
    pub source: EventSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
