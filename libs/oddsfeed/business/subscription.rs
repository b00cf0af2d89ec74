//! Per-match upstream subscription tracking
//!
//! Upstream subscribe/unsubscribe calls for one match are serialized by a
//! per-match lock. The map lock is only taken around map reads and writes,
//! never across an upstream call.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{Event, FeedError, Result};
use crate::ingestion::{EventDataSource, SourceFilter};
use crate::processing::{handler_fn, EventHandler};
use crate::utils::spawn_ticker;

pub const STATUS_ACTIVE: &str = "active";

/// Window for counting a subscription as active in stats
const ACTIVE_WINDOW_SECS: i64 = 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionInfo {
    pub match_id: String,
    pub subscribed_at: DateTime<Utc>,
    /// `None` until the first event is recorded
    pub last_event_time: Option<DateTime<Utc>>,
    pub event_count: u64,
    pub status: String,
    /// Inactivity cleanup only retires subscriptions with this set
    pub auto_unsubscribe: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubscriptionStats {
    pub total_subscriptions: usize,
    pub active_subscriptions: usize,
    pub total_events: u64,
}

type MatchLocks = parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>;

/// Held while an upstream call for one match is in progress
struct MatchLock<'a> {
    locks: &'a MatchLocks,
    match_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for MatchLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock();
        let idle = locks
            .get(&self.match_id)
            .map_or(false, |lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(&self.match_id);
        }
    }
}

pub struct SubscriptionService {
    source: Arc<dyn EventDataSource>,
    subscriptions: RwLock<HashMap<String, SubscriptionInfo>>,
    match_locks: MatchLocks,
}

impl SubscriptionService {
    pub fn new(source: Arc<dyn EventDataSource>) -> Self {
        Self {
            source,
            subscriptions: RwLock::new(HashMap::new()),
            match_locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    async fn lock_match(&self, match_id: &str) -> MatchLock<'_> {
        let lock = Arc::clone(
            self.match_locks
                .lock()
                .entry(match_id.to_string())
                .or_default(),
        );
        MatchLock {
            locks: &self.match_locks,
            match_id: match_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Subscribe upstream to `match_id`. A no-op if already tracked.
    pub async fn subscribe(&self, match_id: &str) -> Result<()> {
        let _lock = self.lock_match(match_id).await;
        if self.subscriptions.read().await.contains_key(match_id) {
            debug!(match_id = %match_id, "[Subscriptions] Already subscribed");
            return Ok(());
        }

        self.source.subscribe(&SourceFilter::for_match(match_id)).await?;

        self.subscriptions.write().await.insert(
            match_id.to_string(),
            SubscriptionInfo {
                match_id: match_id.to_string(),
                subscribed_at: Utc::now(),
                last_event_time: None,
                event_count: 0,
                status: STATUS_ACTIVE.to_string(),
                auto_unsubscribe: true,
            },
        );
        info!(match_id = %match_id, "[Subscriptions] Subscribed");
        Ok(())
    }

    /// Unsubscribe upstream from `match_id`. A no-op if untracked.
    pub async fn unsubscribe(&self, match_id: &str) -> Result<()> {
        let _lock = self.lock_match(match_id).await;
        if !self.subscriptions.read().await.contains_key(match_id) {
            debug!(match_id = %match_id, "[Subscriptions] Not subscribed");
            return Ok(());
        }

        self.source.unsubscribe(&SourceFilter::for_match(match_id)).await?;

        self.subscriptions.write().await.remove(match_id);
        info!(match_id = %match_id, "[Subscriptions] Unsubscribed");
        Ok(())
    }

    pub async fn get_subscriptions(&self) -> Vec<SubscriptionInfo> {
        let mut subscriptions: Vec<SubscriptionInfo> =
            self.subscriptions.read().await.values().cloned().collect();
        subscriptions.sort_by(|a, b| a.match_id.cmp(&b.match_id));
        subscriptions
    }

    pub async fn get_subscription(&self, match_id: &str) -> Result<SubscriptionInfo> {
        self.subscriptions
            .read()
            .await
            .get(match_id)
            .cloned()
            .ok_or_else(|| FeedError::NotFound(format!("subscription {}", match_id)))
    }

    /// Set the event count and refresh the last event time
    pub async fn update_subscription(&self, match_id: &str, event_count: u64) -> Result<()> {
        let mut subscriptions = self.subscriptions.write().await;
        let info = subscriptions
            .get_mut(match_id)
            .ok_or_else(|| FeedError::NotFound(format!("subscription {}", match_id)))?;
        info.event_count = event_count;
        info.last_event_time = Some(Utc::now());
        Ok(())
    }

    /// Count one more event for `match_id` and refresh the last event time
    pub async fn record_activity(&self, match_id: &str) -> Result<()> {
        let mut subscriptions = self.subscriptions.write().await;
        let info = subscriptions
            .get_mut(match_id)
            .ok_or_else(|| FeedError::NotFound(format!("subscription {}", match_id)))?;
        info.event_count += 1;
        info.last_event_time = Some(Utc::now());
        Ok(())
    }

    pub async fn set_auto_unsubscribe(&self, match_id: &str, enabled: bool) -> Result<()> {
        let mut subscriptions = self.subscriptions.write().await;
        let info = subscriptions
            .get_mut(match_id)
            .ok_or_else(|| FeedError::NotFound(format!("subscription {}", match_id)))?;
        info.auto_unsubscribe = enabled;
        Ok(())
    }

    /// Unsubscribe every subscription whose last event is older than
    /// `inactive_after`. Subscriptions that never saw an event are kept.
    /// Upstream failures are logged and the entry is left in place.
    ///
    /// Returns the number of subscriptions removed.
    pub async fn cleanup_inactive_subscriptions(&self, inactive_after: Duration) -> usize {
        let stale: Vec<String> = self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|info| is_stale(info, inactive_after))
            .map(|info| info.match_id.clone())
            .collect();

        let mut removed = 0;
        for match_id in stale {
            let _lock = self.lock_match(&match_id).await;
            // Activity may have arrived while waiting for the match lock
            let still_stale = self
                .subscriptions
                .read()
                .await
                .get(&match_id)
                .map_or(false, |info| is_stale(info, inactive_after));
            if !still_stale {
                continue;
            }

            match self.source.unsubscribe(&SourceFilter::for_match(&match_id)).await {
                Ok(()) => {
                    self.subscriptions.write().await.remove(&match_id);
                    removed += 1;
                    info!(match_id = %match_id, "[Subscriptions] Inactive subscription removed");
                }
                Err(e) => {
                    warn!(match_id = %match_id, error = %e, "[Subscriptions] Cleanup unsubscribe failed");
                }
            }
        }

        if removed > 0 {
            let remaining = self.subscriptions.read().await.len();
            info!(removed, remaining, "[Subscriptions] Cleanup finished");
        }
        removed
    }

    pub async fn get_subscription_stats(&self) -> SubscriptionStats {
        let active_since = Utc::now() - ChronoDuration::seconds(ACTIVE_WINDOW_SECS);
        let subscriptions = self.subscriptions.read().await;

        SubscriptionStats {
            total_subscriptions: subscriptions.len(),
            active_subscriptions: subscriptions
                .values()
                .filter(|info| info.last_event_time.map_or(false, |last| last > active_since))
                .count(),
            total_events: subscriptions.values().map(|info| info.event_count).sum(),
        }
    }

    /// Dispatcher handler that records activity for tracked matches.
    /// Events for untracked matches are ignored.
    pub fn activity_handler(self: &Arc<Self>) -> Arc<dyn EventHandler> {
        let service = Arc::clone(self);
        handler_fn(move |event: Arc<Event>| {
            let service = Arc::clone(&service);
            async move {
                match service.record_activity(&event.match_id).await {
                    Err(FeedError::NotFound(_)) => Ok(()),
                    other => other,
                }
            }
        })
    }

    /// Run inactivity cleanup every `interval` until `token` is cancelled
    pub fn spawn_cleanup_loop(
        self: &Arc<Self>,
        interval: Duration,
        inactive_after: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let service = Arc::clone(self);
        spawn_ticker("subscription-cleanup", interval, token, move || {
            let service = Arc::clone(&service);
            async move {
                service.cleanup_inactive_subscriptions(inactive_after).await;
                ControlFlow::Continue(())
            }
        })
    }
}

fn is_stale(info: &SubscriptionInfo, inactive_after: Duration) -> bool {
    let now = Utc::now();
    info.auto_unsubscribe
        && info.last_event_time.map_or(false, |last| {
            (now - last).to_std().map_or(false, |age| age > inactive_after)
        })
}
