//! Periodic trigger
//!
//! Fires the runner on a fixed interval. Fire-and-forget: the trigger
//! never queues ticks; if the previous tick is still running, the runner
//! reports busy and the trigger simply waits for the next interval.

use crate::queue::{Runner, TickOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Drives [`Runner::tick`] on a fixed schedule until cancelled
pub struct Trigger {
    interval: Duration,
    fetch_only: bool,
    cancel: CancellationToken,
}

impl Trigger {
    /// Create a trigger with the given interval
    ///
    /// When `fetch_only` is set, every tick refreshes the cached view but
    /// never rebases or submits.
    #[must_use]
    pub fn new(interval: Duration, fetch_only: bool) -> Self {
        Self {
            interval,
            fetch_only,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the trigger loop when cancelled
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the trigger loop; returns when cancelled
    ///
    /// The first tick fires immediately, later ones on the interval. A tick
    /// that overruns its interval delays the next one instead of bursting.
    pub async fn run(self, runner: Arc<Runner>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("trigger stopped");
                    break;
                }
                _ = ticker.tick() => {}
            }

            match runner.tick(self.fetch_only).await {
                TickOutcome::Busy => debug!("previous tick still running, trigger dropped"),
                outcome => debug!(?outcome, "tick finished"),
            }
        }
    }
}
