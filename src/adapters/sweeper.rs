//! ExpirySweeper - Background loop that retires stale upgrades.
//!
//! Each tick runs `ExpireStaleUpgradesHandler`. A failed sweep is logged and
//! the loop carries on; the next tick picks the same records up again.
//!
//! ## Graceful Shutdown
//!
//! The loop listens on a watch channel and stops after the current sweep
//! once `true` is sent.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::application::handlers::upgrade::{ExpireStaleUpgradesHandler, SweepReport};
use crate::domain::foundation::Timestamp;

pub struct ExpirySweeper {
    handler: ExpireStaleUpgradesHandler,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(handler: ExpireStaleUpgradesHandler, interval: Duration) -> Self {
        Self { handler, interval }
    }

    /// Run until the shutdown channel flips to `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_secs = self.interval.as_secs(), "Expiry sweeper started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.sweep_once().await;
                }
            }
        }

        tracing::info!("Expiry sweeper stopped");
    }

    /// Run a single sweep, logging instead of returning failures.
    pub async fn sweep_once(&self) -> SweepReport {
        match self.handler.handle(Timestamp::now()).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "Expiry sweep failed");
                SweepReport::default()
            }
        }
    }
}
