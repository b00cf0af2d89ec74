//! Event fan-out
//!
//! Subscribers are kept in buckets keyed by the first entry of their
//! event-type filter (or `"all"`). Every dispatch evaluates every
//! subscriber's filter and runs each matching handler as its own task.
//!
//! Each subscriber owns a semaphore of `max_in_flight` permits. When a
//! subscriber has no free permit the [`OverflowPolicy`] decides whether its
//! delivery is shed or the publisher waits.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Semaphore, TryAcquireError};
use tracing::{debug, info, warn};

use crate::domain::{Event, EventFilter, FeedError, Result};

const ALL_BUCKET: &str = "all";

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Arc<Event>) -> Result<()>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn handle(&self, event: Arc<Event>) -> Result<()> {
        (self.0)(event).await
    }
}

/// Wrap an async closure as a handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

#[derive(Clone)]
pub struct Subscriber {
    pub id: String,
    pub filter: EventFilter,
    pub handler: Arc<dyn EventHandler>,
}

impl Subscriber {
    pub fn new(id: impl Into<String>, filter: EventFilter, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            id: id.into(),
            filter,
            handler,
        }
    }

    fn bucket(&self) -> String {
        self.filter
            .event_types
            .first()
            .map(|t| t.as_str().to_string())
            .unwrap_or_else(|| ALL_BUCKET.to_string())
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Shed the delivery and count it
    Drop,
    /// Make the publisher wait for a free slot
    Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Handler tasks allowed to run at once for a single subscriber
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_overflow")]
    pub overflow: OverflowPolicy,
}

fn default_max_in_flight() -> usize {
    1024
}

fn default_overflow() -> OverflowPolicy {
    OverflowPolicy::Drop
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            overflow: default_overflow(),
        }
    }
}

#[derive(Clone)]
struct Registration {
    subscriber: Subscriber,
    slots: Arc<Semaphore>,
}

pub struct EventDispatcher {
    buckets: RwLock<HashMap<String, Vec<Registration>>>,
    config: DispatcherConfig,
    dropped: AtomicU64,
}

impl EventDispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            config,
            dropped: AtomicU64::new(0),
        }
    }

    fn slots_per_subscriber(&self) -> usize {
        self.config.max_in_flight.max(1)
    }

    pub fn subscribe(&self, subscriber: Subscriber) {
        let bucket = subscriber.bucket();
        info!(subscriber_id = %subscriber.id, bucket = %bucket, "[Dispatcher] Subscriber added");
        let registration = Registration {
            subscriber,
            slots: Arc::new(Semaphore::new(self.slots_per_subscriber())),
        };
        self.buckets.write().entry(bucket).or_default().push(registration);
    }

    pub fn unsubscribe(&self, subscriber_id: &str) -> Result<()> {
        let mut buckets = self.buckets.write();
        for registrations in buckets.values_mut() {
            if let Some(pos) = registrations.iter().position(|r| r.subscriber.id == subscriber_id) {
                registrations.remove(pos);
                info!(subscriber_id = %subscriber_id, "[Dispatcher] Subscriber removed");
                return Ok(());
            }
        }
        Err(FeedError::NotFound(format!("subscriber {}", subscriber_id)))
    }

    pub fn subscribers(&self) -> Vec<Subscriber> {
        self.buckets
            .read()
            .values()
            .flatten()
            .map(|r| r.subscriber.clone())
            .collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.buckets.read().values().map(Vec::len).sum()
    }

    /// Deliveries shed because the subscriber had no free slot
    pub fn dropped_deliveries(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Handler tasks currently running, across all subscribers
    pub fn in_flight(&self) -> usize {
        let slots = self.slots_per_subscriber();
        self.buckets
            .read()
            .values()
            .flatten()
            .map(|r| slots - r.slots.available_permits())
            .sum()
    }

    /// Fan `event` out to every matching subscriber.
    ///
    /// Returns once every delivery has been started or shed. Handler
    /// results never reach the caller.
    pub async fn dispatch(&self, event: Arc<Event>) -> Result<()> {
        let matching: Vec<Registration> = {
            let buckets = self.buckets.read();
            buckets
                .values()
                .flatten()
                .filter(|r| r.subscriber.filter.matches(&event))
                .cloned()
                .collect()
        };

        debug!(event_id = %event.id, matching = matching.len(), "[Dispatcher] Dispatching");

        for Registration { subscriber, slots } in matching {
            let permit = match self.config.overflow {
                OverflowPolicy::Drop => match slots.try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(TryAcquireError::NoPermits) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            subscriber_id = %subscriber.id,
                            event_id = %event.id,
                            "[Dispatcher] Subscriber saturated, delivery dropped"
                        );
                        continue;
                    }
                    Err(TryAcquireError::Closed) => {
                        return Err(FeedError::ProcessingFailed("dispatcher closed".to_string()));
                    }
                },
                OverflowPolicy::Block => slots
                    .acquire_owned()
                    .await
                    .map_err(|_| FeedError::ProcessingFailed("dispatcher closed".to_string()))?,
            };

            let event = Arc::clone(&event);
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = subscriber.handler.handle(Arc::clone(&event)).await {
                    warn!(
                        subscriber_id = %subscriber.id,
                        event_id = %event.id,
                        error = %e,
                        "[Dispatcher] Handler failed"
                    );
                }
            });
        }

        Ok(())
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventSource, EventType};
    use std::time::Duration;
    use tokio::sync::{mpsc, Notify};
    use tokio::time::timeout;

    fn event(id: &str, event_type: EventType) -> Arc<Event> {
        Arc::new(Event::new(id, event_type, EventSource::Uof, "m1"))
    }

    fn forwarding(tx: mpsc::UnboundedSender<String>) -> Arc<dyn EventHandler> {
        handler_fn(move |event: Arc<Event>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(event.id.clone());
                Ok(())
            }
        })
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<String>) -> Option<String> {
        timeout(Duration::from_millis(200), rx.recv()).await.ok().flatten()
    }

    #[tokio::test]
    async fn test_type_filter_and_wildcard() {
        let dispatcher = EventDispatcher::default();
        let (odds_tx, mut odds_rx) = mpsc::unbounded_channel();
        let (all_tx, mut all_rx) = mpsc::unbounded_channel();

        dispatcher.subscribe(Subscriber::new(
            "odds",
            EventFilter::all().with_event_type(EventType::OddsChange),
            forwarding(odds_tx),
        ));
        dispatcher.subscribe(Subscriber::new("all", EventFilter::all(), forwarding(all_tx)));

        dispatcher.dispatch(event("e1", EventType::MatchStatus)).await.unwrap();
        dispatcher.dispatch(event("e2", EventType::OddsChange)).await.unwrap();

        assert_eq!(recv(&mut odds_rx).await.as_deref(), Some("e2"));
        assert!(recv(&mut odds_rx).await.is_none());

        let mut seen = vec![recv(&mut all_rx).await.unwrap(), recv(&mut all_rx).await.unwrap()];
        seen.sort();
        assert_eq!(seen, vec!["e1", "e2"]);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let dispatcher = EventDispatcher::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        dispatcher.subscribe(Subscriber::new(
            "s1",
            EventFilter::all().with_event_type(EventType::Score),
            forwarding(tx.clone()),
        ));
        dispatcher.subscribe(Subscriber::new("s2", EventFilter::all(), forwarding(tx)));
        assert_eq!(dispatcher.subscriber_count(), 2);

        dispatcher.unsubscribe("s1").unwrap();
        assert_eq!(dispatcher.subscriber_count(), 1);
        assert_eq!(dispatcher.subscribers()[0].id, "s2");

        assert!(matches!(dispatcher.unsubscribe("s1"), Err(FeedError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_handler_failure_isolated() {
        let dispatcher = EventDispatcher::default();
        let (tx, mut rx) = mpsc::unbounded_channel();

        dispatcher.subscribe(Subscriber::new(
            "failing",
            EventFilter::all(),
            handler_fn(|_event: Arc<Event>| async {
                Err(FeedError::ProcessingFailed("boom".to_string()))
            }),
        ));
        dispatcher.subscribe(Subscriber::new("ok", EventFilter::all(), forwarding(tx)));

        assert!(dispatcher.dispatch(event("e1", EventType::Score)).await.is_ok());
        assert_eq!(recv(&mut rx).await.as_deref(), Some("e1"));
    }

    #[tokio::test]
    async fn test_drop_policy_sheds_when_saturated() {
        let dispatcher = EventDispatcher::new(DispatcherConfig {
            max_in_flight: 1,
            overflow: OverflowPolicy::Drop,
        });
        let release = Arc::new(Notify::new());
        let gate = Arc::clone(&release);
        dispatcher.subscribe(Subscriber::new(
            "slow",
            EventFilter::all(),
            handler_fn(move |_event: Arc<Event>| {
                let gate = Arc::clone(&gate);
                async move {
                    gate.notified().await;
                    Ok(())
                }
            }),
        ));

        dispatcher.dispatch(event("e1", EventType::Score)).await.unwrap();
        dispatcher.dispatch(event("e2", EventType::Score)).await.unwrap();
        dispatcher.dispatch(event("e3", EventType::Score)).await.unwrap();

        assert_eq!(dispatcher.in_flight(), 1);
        assert_eq!(dispatcher.dropped_deliveries(), 2);

        release.notify_one();
        timeout(Duration::from_secs(1), async {
            while dispatcher.in_flight() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_stalled_subscriber_does_not_starve_others() {
        let dispatcher = EventDispatcher::new(DispatcherConfig {
            max_in_flight: 2,
            overflow: OverflowPolicy::Drop,
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatcher.subscribe(Subscriber::new(
            "stalled",
            EventFilter::all(),
            handler_fn(|_event: Arc<Event>| async {
                std::future::pending::<()>().await;
                Ok(())
            }),
        ));
        dispatcher.subscribe(Subscriber::new("ws", EventFilter::all(), forwarding(tx)));

        for i in 0..10 {
            let id = format!("e{}", i);
            dispatcher.dispatch(event(&id, EventType::Score)).await.unwrap();
            assert_eq!(recv(&mut rx).await, Some(id));
        }

        assert_eq!(dispatcher.dropped_deliveries(), 8);
        assert_eq!(dispatcher.in_flight(), 2);
    }

    #[tokio::test]
    async fn test_block_policy_waits_for_slot() {
        let dispatcher = Arc::new(EventDispatcher::new(DispatcherConfig {
            max_in_flight: 1,
            overflow: OverflowPolicy::Block,
        }));
        let release = Arc::new(Notify::new());
        let gate = Arc::clone(&release);
        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatcher.subscribe(Subscriber::new(
            "slow",
            EventFilter::all(),
            handler_fn(move |event: Arc<Event>| {
                let gate = Arc::clone(&gate);
                let tx = tx.clone();
                async move {
                    gate.notified().await;
                    let _ = tx.send(event.id.clone());
                    Ok(())
                }
            }),
        ));

        dispatcher.dispatch(event("e1", EventType::Score)).await.unwrap();

        let second = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.dispatch(event("e2", EventType::Score)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second.is_finished());

        release.notify_one();
        assert_eq!(recv(&mut rx).await.as_deref(), Some("e1"));
        second.await.unwrap().unwrap();

        release.notify_one();
        assert_eq!(recv(&mut rx).await.as_deref(), Some("e2"));
        assert_eq!(dispatcher.dropped_deliveries(), 0);
    }
}
