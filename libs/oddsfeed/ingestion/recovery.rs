//! Throttled upstream recovery
//!
//! Each source may trigger at most one successful recovery per cooldown
//! window. Failed triggers do not start the window.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{FeedError, Result};
use crate::utils::spawn_ticker;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryKind {
    Full,
    Event,
    Stateful,
}

impl RecoveryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryKind::Full => "full",
            RecoveryKind::Event => "event",
            RecoveryKind::Stateful => "stateful",
        }
    }
}

impl FromStr for RecoveryKind {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(RecoveryKind::Full),
            "event" => Ok(RecoveryKind::Event),
            "stateful" => Ok(RecoveryKind::Stateful),
            other => Err(FeedError::InvalidInput(format!("unknown recovery type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryRequest {
    pub source: String,
    pub kind: RecoveryKind,
    /// How far back to recover, in hours
    pub after_hours: Option<u32>,
    pub products: Vec<String>,
    pub event_id: Option<String>,
}

impl RecoveryRequest {
    pub fn full(source: impl Into<String>) -> Self {
        Self::new(source, RecoveryKind::Full)
    }

    pub fn stateful(source: impl Into<String>) -> Self {
        Self::new(source, RecoveryKind::Stateful)
    }

    pub fn event(source: impl Into<String>, event_id: impl Into<String>) -> Self {
        let mut request = Self::new(source, RecoveryKind::Event);
        request.event_id = Some(event_id.into());
        request
    }

    fn new(source: impl Into<String>, kind: RecoveryKind) -> Self {
        Self {
            source: source.into(),
            kind,
            after_hours: None,
            products: Vec::new(),
            event_id: None,
        }
    }

    pub fn with_after_hours(mut self, hours: u32) -> Self {
        self.after_hours = Some(hours);
        self
    }

    pub fn with_products(mut self, products: Vec<String>) -> Self {
        self.products = products;
        self
    }
}

/// Upstream recovery API
#[async_trait]
pub trait RecoveryEngine: Send + Sync {
    async fn trigger_full_recovery(&self, request: &RecoveryRequest) -> Result<()>;

    async fn trigger_event_recovery(&self, event_id: &str, request: &RecoveryRequest) -> Result<()>;

    async fn trigger_stateful_recovery(&self, request: &RecoveryRequest) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryState {
    NeverRecovered,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryStatus {
    pub source: String,
    pub status: RecoveryState,
    pub last_recovery: Option<DateTime<Utc>>,
    pub message: String,
}

#[derive(Debug, Clone, Copy)]
struct LastRecovery {
    at: Instant,
    wall: DateTime<Utc>,
}

pub struct RecoveryManager {
    engine: Arc<dyn RecoveryEngine>,
    cooldown: Duration,
    last_recovery: RwLock<HashMap<String, LastRecovery>>,
    scheduled: Mutex<HashMap<String, CancellationToken>>,
}

impl RecoveryManager {
    pub fn new(engine: Arc<dyn RecoveryEngine>) -> Self {
        Self::with_cooldown(engine, DEFAULT_COOLDOWN)
    }

    pub fn with_cooldown(engine: Arc<dyn RecoveryEngine>, cooldown: Duration) -> Self {
        Self {
            engine,
            cooldown,
            last_recovery: RwLock::new(HashMap::new()),
            scheduled: Mutex::new(HashMap::new()),
        }
    }

    pub async fn trigger_recovery(&self, request: &RecoveryRequest) -> Result<()> {
        if let Some(last) = self.last_recovery.read().get(&request.source) {
            let elapsed = last.at.elapsed();
            if elapsed < self.cooldown {
                return Err(FeedError::RateLimitExceeded(format!(
                    "recovery too frequent for source {}, retry in {}s",
                    request.source,
                    (self.cooldown - elapsed).as_secs().max(1)
                )));
            }
        }

        info!(
            source = %request.source,
            kind = request.kind.as_str(),
            after_hours = ?request.after_hours,
            "[Recovery] Triggering recovery"
        );

        match request.kind {
            RecoveryKind::Full => self.engine.trigger_full_recovery(request).await?,
            RecoveryKind::Event => {
                let event_id = request
                    .event_id
                    .as_deref()
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| {
                        FeedError::InvalidInput("event ID is required for event recovery".to_string())
                    })?;
                self.engine.trigger_event_recovery(event_id, request).await?
            }
            RecoveryKind::Stateful => self.engine.trigger_stateful_recovery(request).await?,
        }

        self.last_recovery.write().insert(
            request.source.clone(),
            LastRecovery {
                at: Instant::now(),
                wall: Utc::now(),
            },
        );
        info!(source = %request.source, "[Recovery] Recovery triggered");
        Ok(())
    }

    pub fn get_recovery_status(&self, source: &str) -> RecoveryStatus {
        match self.last_recovery.read().get(source) {
            Some(last) => RecoveryStatus {
                source: source.to_string(),
                status: RecoveryState::Completed,
                last_recovery: Some(last.wall),
                message: "Recovery completed successfully".to_string(),
            },
            None => RecoveryStatus {
                source: source.to_string(),
                status: RecoveryState::NeverRecovered,
                last_recovery: None,
                message: "No recovery on record".to_string(),
            },
        }
    }

    /// Trigger `request` every `interval` until `token` (or
    /// [`cancel_scheduled_recovery`](Self::cancel_scheduled_recovery)) stops
    /// it. Failures, including throttling, are logged only.
    ///
    /// Scheduling again for the same source replaces the previous loop.
    pub fn schedule_recovery(
        self: &Arc<Self>,
        request: RecoveryRequest,
        interval: Duration,
        token: &CancellationToken,
    ) -> JoinHandle<()> {
        let loop_token = token.child_token();
        if let Some(previous) = self
            .scheduled
            .lock()
            .insert(request.source.clone(), loop_token.clone())
        {
            previous.cancel();
        }

        info!(
            source = %request.source,
            kind = request.kind.as_str(),
            interval_secs = interval.as_secs(),
            "[Recovery] Recovery scheduled"
        );

        let manager = Arc::clone(self);
        let source = request.source.clone();
        let name = format!("recovery-{}", request.source);
        let ticker = spawn_ticker(name, interval, loop_token, move || {
            let manager = Arc::clone(&manager);
            let request = request.clone();
            async move {
                if let Err(e) = manager.trigger_recovery(&request).await {
                    warn!(source = %request.source, error = %e, "[Recovery] Scheduled recovery failed");
                }
                ControlFlow::Continue(())
            }
        });

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = ticker.await {
                warn!(source = %source, error = %e, "[Recovery] Scheduled recovery ended abnormally");
            }
            manager.forget_stopped(&source);
        })
    }

    /// Drop the schedule entry for `source` once its loop has stopped.
    /// A replacement loop registered under the same source is kept.
    fn forget_stopped(&self, source: &str) {
        let mut scheduled = self.scheduled.lock();
        if scheduled.get(source).map_or(false, CancellationToken::is_cancelled) {
            scheduled.remove(source);
            debug!(source = %source, "[Recovery] Scheduled recovery stopped");
        }
    }

    /// Stop the scheduled loop for `source`. Returns NotFound when no loop
    /// is running, including one already stopped by its parent token.
    pub fn cancel_scheduled_recovery(&self, source: &str) -> Result<()> {
        match self.scheduled.lock().remove(source) {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                info!(source = %source, "[Recovery] Scheduled recovery cancelled");
                Ok(())
            }
            _ => Err(FeedError::NotFound(format!("scheduled recovery for {}", source))),
        }
    }
}
