//! Periodic background loops
//!
//! Every long-running loop in the crate (health checks, heartbeats,
//! scheduled recovery, subscription cleanup) is a [`spawn_ticker`] task:
//!
//! ```text
//! loop {
//!     select! {
//!         cancelled => exit
//!         tick      => run body to completion
//!     }
//! }
//! ```
//!
//! Cancellation is only observed while waiting for the next tick. A body
//! that is already running (for example an upstream recovery request) is
//! never interrupted; the loop exits after it returns.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Spawn a loop that runs `body` every `period` until `token` is cancelled
/// or the body returns `ControlFlow::Break`.
///
/// The first tick fires one full period after spawning.
pub fn spawn_ticker<F, Fut>(
    name: impl Into<String>,
    period: Duration,
    token: CancellationToken,
    mut body: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ControlFlow<()>> + Send,
{
    let name = name.into();
    let period = period.max(MIN_PERIOD);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // Skip the immediate first tick
        ticker.tick().await;
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!(task = %name, ?period, "Ticker started");

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(task = %name, "Ticker cancelled");
                    break;
                }
                _ = ticker.tick() => {}
            }

            if body().await.is_break() {
                debug!(task = %name, "Ticker finished");
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(counter: &Arc<AtomicUsize>) -> impl FnMut() -> std::future::Ready<ControlFlow<()>> {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(ControlFlow::Continue(()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_after_each_period() {
        let counter = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();
        let handle = spawn_ticker("test", Duration::from_secs(10), token.clone(), counting(&counter));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_loop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();
        let handle = spawn_ticker("test", Duration::from_secs(1), token.clone(), counting(&counter));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        token.cancel();
        handle.await.unwrap();

        let ticks = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), ticks);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_body_completes_after_cancel() {
        let finished = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();
        let done = Arc::clone(&finished);

        let handle = spawn_ticker("slow", Duration::from_secs(1), token.clone(), move || {
            let done = Arc::clone(&done);
            async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                done.fetch_add(1, Ordering::SeqCst);
                ControlFlow::Continue(())
            }
        });

        // Inside the first body run
        tokio::time::sleep(Duration::from_secs(2)).await;
        token.cancel();
        handle.await.unwrap();

        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_break_ends_loop() {
        let token = CancellationToken::new();
        let handle = spawn_ticker("once", Duration::from_secs(1), token, || async {
            ControlFlow::Break(())
        });

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(handle.is_finished());
    }
}
