//! Ordered processor chain followed by a single dispatch

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::dispatcher::EventDispatcher;
use super::processor::DataProcessor;
use crate::domain::{Event, FeedError, Result};

/// Ordered processors followed by a single dispatch.
///
/// Processors run fail-fast. The dispatch happens only after all of them
/// succeed, and a dispatch failure does not undo what they stored.
pub struct ProcessingPipeline {
    processors: RwLock<Vec<Arc<dyn DataProcessor>>>,
    dispatcher: Option<Arc<EventDispatcher>>,
}

impl ProcessingPipeline {
    pub fn new(dispatcher: Option<Arc<EventDispatcher>>) -> Self {
        Self {
            processors: RwLock::new(Vec::new()),
            dispatcher,
        }
    }

    pub fn add_processor(&self, processor: Arc<dyn DataProcessor>) {
        info!(processor = processor.name(), "[Pipeline] Processor added");
        self.processors.write().push(processor);
    }

    pub fn remove_processor(&self, name: &str) -> Result<()> {
        let mut processors = self.processors.write();
        match processors.iter().position(|p| p.name() == name) {
            Some(pos) => {
                processors.remove(pos);
                info!(processor = name, "[Pipeline] Processor removed");
                Ok(())
            }
            None => Err(FeedError::NotFound(format!("processor {}", name))),
        }
    }

    pub fn processor_names(&self) -> Vec<String> {
        self.processors
            .read()
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Run `event` through every processor, then dispatch it.
    ///
    /// Returns the processed event as dispatched.
    pub async fn process(&self, mut event: Event) -> Result<Arc<Event>> {
        let processors: Vec<Arc<dyn DataProcessor>> = self.processors.read().clone();

        for processor in &processors {
            if let Err(e) = processor.process(&mut event).await {
                debug!(
                    event_id = %event.id,
                    processor = processor.name(),
                    error = %e,
                    "[Pipeline] Processor failed"
                );
                return Err(e);
            }
        }

        let event = Arc::new(event);
        if let Some(dispatcher) = &self.dispatcher {
            if let Err(e) = dispatcher.dispatch(Arc::clone(&event)).await {
                warn!(event_id = %event.id, error = %e, "[Pipeline] Dispatch failed");
                return Err(e);
            }
        }

        Ok(event)
    }
}
