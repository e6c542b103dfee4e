//! Background GC Scheduler
//!
//! Lazy expiry (checking on read) hides expired entries but never frees
//! them: an entry that is never read again stays in the engine forever.
//! The scheduler periodically asks its target to physically remove every
//! expired entry in the instance's namespace.
//!
//! ## Lifecycle
//!
//! ```text
//!   start() ──► Running ──(interval)──► sweep(now) ──┐
//!                  ▲                                  │
//!                  └──────────────────────────────────┘
//!                  │
//!               stop() ──► signal shutdown, await task ──► Stopped
//! ```
//!
//! - The first sweep happens one interval after `start`.
//! - A failed sweep is logged and the loop keeps going.
//! - `stop` returns only after the task has exited, so no sweep can race
//!   with the adapter releasing its connections.
//! - Dropping the scheduler without calling `stop` still signals shutdown.

use crate::error::Result;
use crate::storage::expiry::unix_millis_now;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Default interval between sweeps.
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(10);

/// Something the scheduler can sweep.
#[async_trait]
pub trait Sweep: Send + Sync + 'static {
    /// Removes every entry whose deadline is at or before `now` (unix ms).
    ///
    /// Returns the number of entries removed.
    async fn sweep(&self, now: i64) -> Result<u64>;
}

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcState {
    Running,
    Stopped,
}

/// A handle to the running GC task.
#[derive(Debug)]
pub struct GcScheduler {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,

    /// Task handle, taken by the first `stop`
    task: Mutex<Option<JoinHandle<()>>>,

    interval: Duration,
}

impl GcScheduler {
    /// Starts sweeping `target` every `interval`.
    ///
    /// A zero interval falls back to [`DEFAULT_GC_INTERVAL`].
    pub fn start<S: Sweep>(target: Arc<S>, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            DEFAULT_GC_INTERVAL
        } else {
            interval
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(gc_loop(target, interval, shutdown_rx));

        debug!(interval_ms = interval.as_millis() as u64, "GC scheduler started");

        Self {
            shutdown_tx,
            task: Mutex::new(Some(task)),
            interval,
        }
    }

    /// The interval between sweeps.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns the current state.
    pub fn state(&self) -> GcState {
        match self.task.lock().unwrap().as_ref() {
            Some(task) if !task.is_finished() => GcState::Running,
            _ => GcState::Stopped,
        }
    }

    /// Stops the scheduler and waits for the task to exit.
    ///
    /// Calling this more than once is a no-op.
    pub async fn stop(&self) {
        let task = self.task.lock().unwrap().take();
        let Some(task) = task else {
            return;
        };

        let _ = self.shutdown_tx.send(true);
        if let Err(e) = task.await {
            warn!(error = %e, "GC task ended abnormally");
        }
        info!("GC scheduler stopped");
    }
}

impl Drop for GcScheduler {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// The main GC loop.
async fn gc_loop<S: Sweep>(
    target: Arc<S>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // Wait for the next tick or the shutdown signal
        tokio::select! {
            _ = ticker.tick() => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("GC scheduler received shutdown signal");
                    return;
                }
                continue;
            }
        }

        match target.sweep(unix_millis_now()).await {
            Ok(0) => {}
            Ok(removed) => debug!(removed = removed, "Expired entries removed"),
            Err(e) => warn!(error = %e, "GC sweep failed"),
        }
    }
}
