//! Storage contract
//!
//! The pipeline only needs [`DataStorage`]; durable backends live outside
//! this crate. [`InMemoryStorage`] is the reference implementation used by
//! the server binary and the tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::domain::{
    Event, EventSource, EventType, FeedError, Match, MatchStatus, Odds, Result,
};

/// Event query. Empty lists match everything.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub event_types: Vec<EventType>,
    pub match_ids: Vec<String>,
    pub sport_ids: Vec<String>,
    pub sources: Vec<EventSource>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl EventQuery {
    fn matches(&self, event: &Event) -> bool {
        (self.event_types.is_empty() || self.event_types.contains(&event.event_type))
            && (self.match_ids.is_empty() || self.match_ids.contains(&event.match_id))
            && (self.sport_ids.is_empty() || self.sport_ids.contains(&event.sport_id))
            && (self.sources.is_empty() || self.sources.contains(&event.source))
            && self.start_time.map_or(true, |start| event.timestamp >= start)
            && self.end_time.map_or(true, |end| event.timestamp <= end)
    }
}

/// Match query. Empty lists match everything.
#[derive(Debug, Clone, Default)]
pub struct MatchQuery {
    pub sport_ids: Vec<String>,
    pub statuses: Vec<MatchStatus>,
    pub sources: Vec<EventSource>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl MatchQuery {
    fn matches(&self, m: &Match) -> bool {
        (self.sport_ids.is_empty() || self.sport_ids.contains(&m.sport_id))
            && (self.statuses.is_empty() || self.statuses.contains(&m.status))
            && (self.sources.is_empty() || self.sources.contains(&m.source))
            && self.start_date.map_or(true, |start| m.start_time >= start)
            && self.end_date.map_or(true, |end| m.start_time <= end)
    }
}

/// Persistence of events, matches and odds.
///
/// Every method may fail with [`FeedError::StorageFailed`]. Lookups of a
/// missing id fail with [`FeedError::NotFound`].
#[async_trait]
pub trait DataStorage: Send + Sync {
    async fn save_event(&self, event: &Event) -> Result<()>;
    async fn save_match(&self, m: &Match) -> Result<()>;
    async fn save_odds(&self, odds: &Odds) -> Result<()>;
    async fn get_event(&self, id: &str) -> Result<Event>;
    async fn get_match(&self, id: &str) -> Result<Match>;
    async fn get_odds(&self, match_id: &str) -> Result<Vec<Odds>>;
    async fn query_events(&self, query: &EventQuery) -> Result<Vec<Event>>;
    async fn query_matches(&self, query: &MatchQuery) -> Result<Vec<Match>>;
}

fn paginate<T>(items: Vec<T>, offset: usize, limit: Option<usize>) -> Vec<T> {
    let iter = items.into_iter().skip(offset);
    match limit {
        Some(limit) => iter.take(limit).collect(),
        None => iter.collect(),
    }
}

#[derive(Default)]
pub struct InMemoryStorage {
    events: RwLock<HashMap<String, Event>>,
    matches: RwLock<HashMap<String, Match>>,
    /// Keyed by odds id
    odds: RwLock<HashMap<String, Odds>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_count(&self) -> usize {
        self.events.read().len()
    }
}

#[async_trait]
impl DataStorage for InMemoryStorage {
    async fn save_event(&self, event: &Event) -> Result<()> {
        if event.id.is_empty() {
            return Err(FeedError::StorageFailed("event id is empty".to_string()));
        }
        self.events.write().insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn save_match(&self, m: &Match) -> Result<()> {
        if m.id.is_empty() {
            return Err(FeedError::StorageFailed("match id is empty".to_string()));
        }
        self.matches.write().insert(m.id.clone(), m.clone());
        Ok(())
    }

    async fn save_odds(&self, odds: &Odds) -> Result<()> {
        if odds.id.is_empty() {
            return Err(FeedError::StorageFailed("odds id is empty".to_string()));
        }
        self.odds.write().insert(odds.id.clone(), odds.clone());
        Ok(())
    }

    async fn get_event(&self, id: &str) -> Result<Event> {
        self.events
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| FeedError::NotFound(format!("event {}", id)))
    }

    async fn get_match(&self, id: &str) -> Result<Match> {
        self.matches
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| FeedError::NotFound(format!("match {}", id)))
    }

    async fn get_odds(&self, match_id: &str) -> Result<Vec<Odds>> {
        let mut odds: Vec<Odds> = self
            .odds
            .read()
            .values()
            .filter(|o| o.match_id == match_id)
            .cloned()
            .collect();
        odds.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(odds)
    }

    async fn query_events(&self, query: &EventQuery) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self
            .events
            .read()
            .values()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(paginate(events, query.offset, query.limit))
    }

    async fn query_matches(&self, query: &MatchQuery) -> Result<Vec<Match>> {
        let mut matches: Vec<Match> = self
            .matches
            .read()
            .values()
            .filter(|m| query.matches(m))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.start_time.cmp(&a.start_time).then_with(|| a.id.cmp(&b.id)));
        Ok(paginate(matches, query.offset, query.limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OddsStatus, Outcome, Team};
    use chrono::Duration;

    fn event(id: &str, event_type: EventType, match_id: &str, age_mins: i64) -> Event {
        Event::new(id, event_type, EventSource::Uof, match_id)
            .with_timestamp(Utc::now() - Duration::minutes(age_mins))
    }

    fn fixture(id: &str, sport_id: &str, status: MatchStatus, start_in_hours: i64) -> Match {
        let now = Utc::now();
        Match {
            id: id.to_string(),
            sport_id: sport_id.to_string(),
            sport_name: String::new(),
            home_team: Team { id: "t1".to_string(), name: "Home".to_string() },
            away_team: Team { id: "t2".to_string(), name: "Away".to_string() },
            status,
            start_time: now + Duration::hours(start_in_hours),
            score: None,
            statistics: None,
            source: EventSource::Uof,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_save_and_get_event() {
        let storage = InMemoryStorage::new();
        let e = event("e1", EventType::OddsChange, "m1", 0);
        storage.save_event(&e).await.unwrap();

        assert_eq!(storage.get_event("e1").await.unwrap(), e);
        assert!(matches!(
            storage.get_event("missing").await,
            Err(FeedError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_query_events_filters_and_paginates() {
        let storage = InMemoryStorage::new();
        storage.save_event(&event("e1", EventType::OddsChange, "m1", 30)).await.unwrap();
        storage.save_event(&event("e2", EventType::OddsChange, "m1", 20)).await.unwrap();
        storage.save_event(&event("e3", EventType::Score, "m1", 10)).await.unwrap();
        storage.save_event(&event("e4", EventType::OddsChange, "m2", 5)).await.unwrap();

        let query = EventQuery {
            event_types: vec![EventType::OddsChange],
            match_ids: vec!["m1".to_string()],
            ..Default::default()
        };
        let ids: Vec<String> = storage
            .query_events(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["e2", "e1"]);

        let page = EventQuery {
            offset: 1,
            limit: Some(2),
            ..Default::default()
        };
        let ids: Vec<String> = storage
            .query_events(&page)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["e3", "e2"]);

        let window = EventQuery {
            start_time: Some(Utc::now() - Duration::minutes(15)),
            ..Default::default()
        };
        assert_eq!(storage.query_events(&window).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_query_matches_by_status() {
        let storage = InMemoryStorage::new();
        storage.save_match(&fixture("m1", "sr:sport:1", MatchStatus::Live, 0)).await.unwrap();
        storage.save_match(&fixture("m2", "sr:sport:1", MatchStatus::NotStarted, 2)).await.unwrap();
        storage.save_match(&fixture("m3", "sr:sport:2", MatchStatus::Live, 1)).await.unwrap();

        let live = MatchQuery {
            statuses: vec![MatchStatus::Live],
            ..Default::default()
        };
        let ids: Vec<String> = storage
            .query_matches(&live)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["m3", "m1"]);

        assert_eq!(storage.get_match("m2").await.unwrap().status, MatchStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_odds_by_match() {
        let storage = InMemoryStorage::new();
        let odds = Odds {
            id: "o1".to_string(),
            match_id: "m1".to_string(),
            market_id: "1".to_string(),
            market_name: "1x2".to_string(),
            outcomes: vec![
                Outcome { id: "1".to_string(), name: "home".to_string(), odds: 1.85, probability: None, active: true },
                Outcome { id: "2".to_string(), name: "draw".to_string(), odds: 3.4, probability: None, active: false },
            ],
            status: OddsStatus::Active,
            source: EventSource::Uof,
            timestamp: Utc::now(),
        };
        storage.save_odds(&odds).await.unwrap();

        let found = storage.get_odds("m1").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].active_outcomes().count(), 1);
        assert!(storage.get_odds("m2").await.unwrap().is_empty());
    }
}
