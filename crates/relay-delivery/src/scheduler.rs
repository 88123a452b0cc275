//! Timer that issues sweep triggers until shut down.

use std::{sync::Arc, time::Duration};

use relay_core::Clock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::relay::{Relay, RelayOutcome, Trigger};

/// Issues a sweep trigger every `interval`.
///
/// The first sweep runs immediately so a backlog left by a previous process
/// is picked up at startup.
pub struct SweepScheduler {
    relay: Arc<Relay>,
    interval: Duration,
    clock: Arc<dyn Clock>,
    cancellation_token: CancellationToken,
}

impl SweepScheduler {
    /// Creates a scheduler; it stops once `cancellation_token` is cancelled.
    pub fn new(
        relay: Arc<Relay>,
        interval: Duration,
        clock: Arc<dyn Clock>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self { relay, interval, clock, cancellation_token }
    }

    /// Runs one sweep trigger.
    pub async fn tick(&self) -> RelayOutcome {
        self.relay.handle(Trigger::Sweep).await
    }

    /// Sweeps on every interval until cancelled. Returns the number of
    /// sweeps that ran.
    pub async fn run(&self) -> u64 {
        info!(interval_secs = self.interval.as_secs(), "sweep scheduler starting");
        let mut ticks = 0u64;

        loop {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            let outcome = self.tick().await;
            ticks += 1;
            debug!(tick = ticks, ?outcome, "scheduled sweep finished");

            tokio::select! {
                () = self.clock.sleep(self.interval) => {}
                () = self.cancellation_token.cancelled() => break,
            }
        }

        info!(ticks, "sweep scheduler stopped");
        ticks
    }
}
