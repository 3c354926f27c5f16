//! Periodic, cancellable code rotation.
//!
//! The scheduler runs one background task per active session. Every interval
//! it invokes the tick callback, which generates the next code, publishes it
//! through the coordinator and refreshes the display.
//!
//! Cancellation is checked between ticks, never mid-tick: once
//! [`RotationHandle::cancel`] returns no new tick will start, but a tick that
//! is already running is allowed to finish. [`RotationHandle::shutdown`]
//! additionally waits for that in-flight tick.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shortest rotation interval the scheduler will run at.
pub const MIN_ROTATION_INTERVAL: Duration = Duration::from_secs(5);

/// Handle to a running rotation task.
#[derive(Debug)]
pub struct RotationHandle {
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

impl RotationHandle {
    /// Stop future ticks. Does not wait for an in-flight tick.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Whether the rotation task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel and wait for the task (and any in-flight tick) to finish.
    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        if let Err(e) = self.task.await {
            warn!(target: "rc.rotation", error = ?e, "Rotation task panicked");
        }
    }
}

/// Spawns rotation tasks.
pub struct RotationScheduler;

impl RotationScheduler {
    /// Start invoking `on_tick` every `interval` until cancelled.
    ///
    /// The first tick fires one full interval after spawning. The task also
    /// stops when `on_tick` returns `ControlFlow::Break`. Intervals below
    /// [`MIN_ROTATION_INTERVAL`] are raised to it.
    pub fn spawn<F, Fut>(
        interval: Duration,
        cancel_token: CancellationToken,
        mut on_tick: F,
    ) -> RotationHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let interval = if interval < MIN_ROTATION_INTERVAL {
            warn!(
                target: "rc.rotation",
                requested_ms = interval.as_millis(),
                minimum_ms = MIN_ROTATION_INTERVAL.as_millis(),
                "Rotation interval below minimum, clamping"
            );
            MIN_ROTATION_INTERVAL
        } else {
            interval
        };

        let token = cancel_token.clone();
        let first_tick = Instant::now() + interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                target: "rc.rotation",
                interval_secs = interval.as_secs(),
                "Code rotation started"
            );

            let mut ticks: u64 = 0;
            loop {
                tokio::select! {
                    biased;

                    () = token.cancelled() => {
                        break;
                    }
                    _ = ticker.tick() => {
                        // Cancellation may race with the timer; never start a
                        // tick once it has been observed.
                        if token.is_cancelled() {
                            break;
                        }
                        ticks += 1;
                        if on_tick().await.is_break() {
                            debug!(target: "rc.rotation", ticks, "Tick requested stop");
                            break;
                        }
                    }
                }
            }

            info!(target: "rc.rotation", ticks, "Code rotation stopped");
        });

        RotationHandle { cancel_token, task }
    }
}
