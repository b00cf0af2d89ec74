//! Per-event processing
//!
//! Validates, stamps `processed_at`, applies type-directed handling and
//! persists the event.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::DataStorage;
use super::validator::DataValidator;
use crate::domain::{Event, EventType, FeedError, Result};

#[async_trait]
pub trait DataProcessor: Send + Sync {
    fn name(&self) -> &str;

    async fn process(&self, event: &mut Event) -> Result<()>;
}

pub struct EventProcessor {
    name: String,
    validator: Option<Arc<dyn DataValidator>>,
    storage: Arc<dyn DataStorage>,
}

impl EventProcessor {
    pub fn new(name: impl Into<String>, storage: Arc<dyn DataStorage>) -> Self {
        Self {
            name: name.into(),
            validator: None,
            storage,
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn DataValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    fn handle_odds_change(&self, event: &Event) {
        debug!(
            event_id = %event.id,
            match_id = %event.match_id,
            event_type = %event.event_type,
            "[Processor] Odds update"
        );
    }

    fn handle_match_update(&self, event: &Event) {
        debug!(
            event_id = %event.id,
            match_id = %event.match_id,
            event_type = %event.event_type,
            "[Processor] Match update"
        );
    }

    fn handle_settlement(&self, event: &Event) {
        debug!(
            event_id = %event.id,
            match_id = %event.match_id,
            "[Processor] Settlement"
        );
    }
}

#[async_trait]
impl DataProcessor for EventProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, event: &mut Event) -> Result<()> {
        if let Some(validator) = &self.validator {
            validator.validate(event)?;
        }

        if event.processed_at.is_none() {
            event.processed_at = Some(Utc::now());
        }

        match &event.event_type {
            EventType::OddsChange | EventType::BetStop => self.handle_odds_change(event),
            EventType::MatchStatus
            | EventType::MatchInfo
            | EventType::Score
            | EventType::Statistics => self.handle_match_update(event),
            EventType::BetSettlement => self.handle_settlement(event),
            EventType::Unknown(raw) => {
                warn!(event_id = %event.id, event_type = %raw, "[Processor] Unknown event type");
            }
        }

        self.storage.save_event(event).await.map_err(|e| match e {
            FeedError::StorageFailed(_) => e,
            other => FeedError::StorageFailed(other.to_string()),
        })
    }
}
