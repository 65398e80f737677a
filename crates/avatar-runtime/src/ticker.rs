//! [`FrameTask`] – the cancellable per-frame registration.
//!
//! Moves an [`AvatarLoop`] onto a tokio task that ticks it on a fixed
//! interval with time measured from the moment the task was spawned.
//! [`FrameTask::stop`] cancels the interval, restores any in-flight wave to
//! its base pose, and hands the loop back.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::controller::AvatarLoop;

/// Owned handle to a running frame loop.
pub struct FrameTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<AvatarLoop>,
}

impl FrameTask {
    /// Tick `avatar` every `period` until stopped.
    pub fn spawn(avatar: AvatarLoop, period: Duration) -> Self {
        Self::spawn_with(avatar, period, |_| {})
    }

    /// Like [`spawn`](Self::spawn), calling `before_tick(now)` ahead of every
    /// tick (e.g. to advance a simulation clock).
    pub fn spawn_with<F>(mut avatar: AvatarLoop, period: Duration, mut before_tick: F) -> Self
    where
        F: FnMut(Duration) + Send + 'static,
    {
        let (shutdown, mut stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let start = Instant::now();
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(period_ms = period.as_millis() as u64, "frame loop started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = start.elapsed();
                        before_tick(now);
                        avatar.tick(now);
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            let now = start.elapsed();
            if avatar.shutdown(now) {
                debug!("in-flight wave restored on stop");
            }
            avatar
        });
        Self { shutdown, handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the frame loop and get the [`AvatarLoop`] back with every
    /// joint on its rest pose.
    pub async fn stop(self) -> Result<AvatarLoop, tokio::task::JoinError> {
        // A closed channel means the task already exited; the join still
        // returns the loop.
        let _ = self.shutdown.send(true);
        self.handle.await
    }
}
