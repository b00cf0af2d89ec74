//! Event validation
//!
//! Validators never correct an event. The first failing rule rejects it.

use chrono::{Duration, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

use crate::domain::{Event, FeedError, Result};

/// Maximum allowed clock skew into the future, in seconds
pub const MAX_FUTURE_SKEW_SECS: i64 = 5 * 60;
/// Maximum event age, in seconds
pub const MAX_EVENT_AGE_SECS: i64 = 24 * 60 * 60;

pub trait DataValidator: Send + Sync {
    fn validate(&self, event: &Event) -> Result<()>;
}

type Check = Box<dyn Fn(&Event) -> std::result::Result<(), String> + Send + Sync>;

/// A single named check
pub struct ValidationRule {
    name: &'static str,
    check: Check,
}

impl ValidationRule {
    pub fn new<F>(name: &'static str, check: F) -> Self
    where
        F: Fn(&Event) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        Self {
            name,
            check: Box::new(check),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Ordered rule list with fail-fast evaluation
pub struct EventValidator {
    rules: Vec<ValidationRule>,
}

impl EventValidator {
    /// Validator with the default rule set: id, type, source, timestamp
    pub fn new() -> Self {
        Self::empty()
            .with_rule(ValidationRule::new("id", check_id))
            .with_rule(ValidationRule::new("type", check_type))
            .with_rule(ValidationRule::new("source", check_source))
            .with_rule(ValidationRule::new("timestamp", check_timestamp))
    }

    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: ValidationRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }
}

impl Default for EventValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl DataValidator for EventValidator {
    fn validate(&self, event: &Event) -> Result<()> {
        for rule in &self.rules {
            if let Err(reason) = (rule.check)(event) {
                debug!(event_id = %event.id, rule = rule.name, %reason, "Event rejected");
                return Err(FeedError::validation(rule.name, reason));
            }
        }
        Ok(())
    }
}

fn check_id(event: &Event) -> std::result::Result<(), String> {
    if event.id.is_empty() {
        return Err("event ID is required".to_string());
    }
    Ok(())
}

fn check_type(event: &Event) -> std::result::Result<(), String> {
    if !event.event_type.is_known() {
        return Err(format!("invalid event type: {}", event.event_type));
    }
    Ok(())
}

fn check_source(event: &Event) -> std::result::Result<(), String> {
    if !event.source.is_known() {
        return Err(format!("invalid event source: {}", event.source));
    }
    Ok(())
}

fn check_timestamp(event: &Event) -> std::result::Result<(), String> {
    let now = Utc::now();
    if event.timestamp > now + Duration::seconds(MAX_FUTURE_SKEW_SECS) {
        return Err("event timestamp is in the future".to_string());
    }
    if event.timestamp < now - Duration::seconds(MAX_EVENT_AGE_SECS) {
        return Err("event timestamp is too old (>24h)".to_string());
    }
    Ok(())
}

/// Runs a list of validators in order, first error wins
#[derive(Default)]
pub struct CompositeValidator {
    validators: RwLock<Vec<Arc<dyn DataValidator>>>,
}

impl CompositeValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_validator(&self, validator: Arc<dyn DataValidator>) {
        let mut validators = self.validators.write();
        validators.push(validator);
        debug!(count = validators.len(), "Added validator");
    }

    pub fn len(&self) -> usize {
        self.validators.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.read().is_empty()
    }
}

impl DataValidator for CompositeValidator {
    fn validate(&self, event: &Event) -> Result<()> {
        let validators = self.validators.read();
        for validator in validators.iter() {
            validator.validate(event)?;
        }
        Ok(())
    }
}
