//! Periodic rotation of the presence window

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, trace};

use super::{PresenceError, PresenceWindow};

/// The one task allowed to rotate a given window.
pub struct RotationDriver {
    window: Arc<PresenceWindow>,
    interval: Duration,
    lock_timeout: Duration,
}

impl RotationDriver {
    /// Bind a driver to `window`. Fails if the window already has one.
    pub fn attach(
        window: Arc<PresenceWindow>,
        interval: Duration,
        lock_timeout: Duration,
    ) -> Result<Self, PresenceError> {
        if !window.claim_driver() {
            return Err(PresenceError::DriverAlreadyAttached);
        }

        Ok(Self {
            window,
            interval,
            lock_timeout,
        })
    }

    /// Rotate every `interval` until a rotation stalls.
    ///
    /// Never returns `Ok`; a stalled rotation would silently stretch the
    /// staleness bound, so it ends the driver instead of being skipped.
    pub async fn run(self) -> Result<(), PresenceError> {
        let mut ticker = tokio::time::interval(self.interval);
        // Every elapsed period must advance the window.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
        // The first tick completes immediately.
        ticker.tick().await;

        info!(
            depth = self.window.depth(),
            interval_ms = self.interval.as_millis() as u64,
            max_staleness_ms = self.window.max_staleness(self.interval).as_millis() as u64,
            "Presence rotation started"
        );

        let mut rotations: u64 = 0;
        loop {
            ticker.tick().await;

            if let Err(e) = self.window.rotate_within(self.lock_timeout).await {
                error!(error = %e, rotations, "Presence rotation stalled");
                return Err(e);
            }

            rotations += 1;
            trace!(rotations, "Rotation tick");
        }
    }

    /// Run the driver on the current runtime.
    pub fn spawn(self) -> JoinHandle<Result<(), PresenceError>> {
        tokio::spawn(self.run())
    }
}
