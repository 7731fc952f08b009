//! Deferred task scheduling abstraction.
//!
//! Decision delivery is deferred to low-priority execution so geometry-batch
//! processing is never blocked by controller-side work. The host may have a
//! real idle-callback primitive; this trait lets it plug one in. The default
//! [`TimerScheduler`] approximates idle execution on a tokio runtime by
//! yielding to already-scheduled tasks, bounded by the timeout.
//!
//! Every scheduled task carries a [`CancellationToken`]; the token is
//! invalidated on slot unregister/teardown and checked before the task body
//! executes, so a task firing after cancellation is a no-op.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// A deferred task body.
pub type DeferredTask = Box<dyn FnOnce() + Send + 'static>;

/// Low-priority task scheduler with a timeout fallback.
///
/// # Implementors
///
/// - [`TimerScheduler`] - default; runs tasks on the tokio runtime
/// - [`InlineScheduler`] - testing; runs tasks immediately on the caller
pub trait DeferredScheduler: Send + Sync {
    /// Schedules `task` for low-priority execution.
    ///
    /// The task must run no later than `timeout` after this call, and must
    /// not run at all if `cancel` has been cancelled by the time it fires.
    fn defer(&self, timeout: Duration, cancel: CancellationToken, task: DeferredTask);
}

/// Default scheduler backed by tokio.
///
/// Spawns the task and yields once so any already-scheduled work (the rest
/// of a geometry batch, other deliveries) runs first. With a non-zero
/// `idle_delay` the task instead waits `min(idle_delay, timeout)`, which
/// gives embedders a knob to batch deliveries behind a quiet period.
#[derive(Clone, Debug)]
pub struct TimerScheduler {
    idle_delay: Duration,
}

impl TimerScheduler {
    /// Scheduler that defers by a single yield (next runtime tick).
    pub fn new() -> Self {
        Self {
            idle_delay: Duration::ZERO,
        }
    }

    /// Scheduler that waits for a quiet period before delivering, never
    /// exceeding the per-call timeout bound.
    pub fn with_idle_delay(idle_delay: Duration) -> Self {
        Self { idle_delay }
    }
}

impl Default for TimerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredScheduler for TimerScheduler {
    fn defer(&self, timeout: Duration, cancel: CancellationToken, task: DeferredTask) {
        let delay = self.idle_delay.min(timeout);
        tokio::spawn(async move {
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
            if !cancel.is_cancelled() {
                task();
            }
        });
    }
}

/// Testing scheduler that runs tasks synchronously on the calling thread.
///
/// Makes decision delivery deterministic in unit tests: by the time
/// `handle_updates` returns, every delivery has been applied.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineScheduler;

impl DeferredScheduler for InlineScheduler {
    fn defer(&self, _timeout: Duration, cancel: CancellationToken, task: DeferredTask) {
        if !cancel.is_cancelled() {
            task();
        }
    }
}
