//! Source channel → pipeline bridge

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::Event;
use crate::processing::ProcessingPipeline;

/// Feed every event from `events` into `pipeline` until the channel
/// closes or `token` is cancelled. Per-event failures are logged and the
/// pump moves on to the next event.
pub fn spawn_event_pump(
    source: impl Into<String>,
    mut events: mpsc::Receiver<Event>,
    pipeline: Arc<ProcessingPipeline>,
    token: CancellationToken,
) -> JoinHandle<()> {
    let source = source.into();

    tokio::spawn(async move {
        let mut processed: u64 = 0;
        let mut failed: u64 = 0;

        loop {
            let event = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let event_id = event.id.clone();
            match pipeline.process(event).await {
                Ok(_) => processed += 1,
                Err(e) if e.is_event_scoped() => {
                    failed += 1;
                    debug!(source = %source, event_id = %event_id, error = %e, "[Pump] Event rejected");
                }
                Err(e) => {
                    failed += 1;
                    warn!(source = %source, event_id = %event_id, error = %e, "[Pump] Event failed");
                }
            }
        }

        info!(source = %source, processed, failed, "[Pump] Event pump stopped");
    })
}
