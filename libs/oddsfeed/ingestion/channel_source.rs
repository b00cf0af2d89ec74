//! In-process event source
//!
//! Events published with [`ChannelSource::publish`] are delivered through
//! the same bounded channel a network-backed source would use, so feed
//! adapters and tests can plug into the pipeline without a live upstream.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::source::{DataSource, EventDataSource, SourceFilter, SourceType};
use crate::domain::{Event, FeedError, Result};

pub const EVENT_CHANNEL_CAPACITY: usize = 1000;

pub struct ChannelSource {
    name: String,
    source_type: SourceType,
    connected: AtomicBool,
    tx: mpsc::Sender<Event>,
    rx: Mutex<Option<mpsc::Receiver<Event>>>,
    subscribed: RwLock<BTreeSet<String>>,
}

impl ChannelSource {
    pub fn new(name: impl Into<String>, source_type: SourceType) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            name: name.into(),
            source_type,
            connected: AtomicBool::new(false),
            tx,
            rx: Mutex::new(Some(rx)),
            subscribed: RwLock::new(BTreeSet::new()),
        }
    }

    /// Push an event into the source's channel. Waits while the channel
    /// is full.
    pub async fn publish(&self, event: Event) -> Result<()> {
        if !self.is_connected() {
            return Err(FeedError::NotConnected(self.name.clone()));
        }
        self.tx
            .send(event)
            .await
            .map_err(|_| FeedError::ProcessingFailed(format!("{} event channel closed", self.name)))
    }

    pub fn subscribed_matches(&self) -> Vec<String> {
        self.subscribed.read().iter().cloned().collect()
    }
}

#[async_trait]
impl DataSource for ChannelSource {
    async fn connect(&self) -> Result<()> {
        if self.connected.swap(true, Ordering::AcqRel) {
            return Err(FeedError::AlreadyConnected(self.name.clone()));
        }
        info!(source = %self.name, "[Channel Source] Connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return Err(FeedError::NotConnected(self.name.clone()));
        }
        info!(source = %self.name, "[Channel Source] Disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> SourceType {
        self.source_type
    }
}

#[async_trait]
impl EventDataSource for ChannelSource {
    async fn subscribe(&self, filter: &SourceFilter) -> Result<()> {
        if !self.is_connected() {
            return Err(FeedError::NotConnected(self.name.clone()));
        }
        let mut subscribed = self.subscribed.write();
        for match_id in &filter.match_ids {
            subscribed.insert(match_id.clone());
        }
        debug!(source = %self.name, matches = ?filter.match_ids, "[Channel Source] Subscribed");
        Ok(())
    }

    async fn unsubscribe(&self, filter: &SourceFilter) -> Result<()> {
        if !self.is_connected() {
            return Err(FeedError::NotConnected(self.name.clone()));
        }
        let mut subscribed = self.subscribed.write();
        for match_id in &filter.match_ids {
            subscribed.remove(match_id);
        }
        debug!(source = %self.name, matches = ?filter.match_ids, "[Channel Source] Unsubscribed");
        Ok(())
    }

    fn take_event_channel(&self) -> Option<mpsc::Receiver<Event>> {
        self.rx.lock().take()
    }
}
