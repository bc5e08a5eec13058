//! Batch scheduler.
//!
//! ```text
//!            enqueue into empty queue
//!   Idle ----------------------------> Scheduled
//!    ^                                  |    ^
//!    | pass leaves queue empty     tick |    | pass leaves work behind
//!    |                                  v    |
//!    +----------------------------- Running -+
//! ```
//!
//! `Running` is reported whenever a pass holds the pass guard, whether it was
//! started by the tick or by a manual trigger. A pass that cannot take the
//! guard is dropped, never queued.

pub mod pass;

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use courier_common::{Signal, internal, tracing};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{Notify, broadcast},
    time::{Instant, MissedTickBehavior},
};

pub use self::pass::{PassOutcome, PassReport};
use crate::service::ReconcileService;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerState {
    /// No timer; waiting for work
    #[default]
    Idle,
    /// Timer armed; a pass runs on every tick
    Scheduled,
    /// A pass is in progress
    Running,
}

/// Scheduling state shared between the serve loop and manual triggers
#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    /// Idle or Scheduled; Running is derived from `in_pass`
    timer: Mutex<SchedulerState>,
    in_pass: AtomicBool,
    wake: Notify,
}

impl Scheduler {
    pub(crate) fn state(&self) -> SchedulerState {
        if self.in_pass.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            *self.timer.lock()
        }
    }

    fn set_timer(&self, state: SchedulerState) {
        *self.timer.lock() = state;
    }

    /// Take the pass guard, or `None` if another pass holds it
    pub(crate) fn try_begin_pass(&self) -> Option<PassGuard<'_>> {
        self.in_pass
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(PassGuard { scheduler: self })
    }

    /// Start the timer if the scheduler is idle
    ///
    /// Only a registered waiter is woken; no permit is stored for later.
    pub(crate) fn wake(&self) {
        if *self.timer.lock() == SchedulerState::Idle {
            self.wake.notify_waiters();
        }
    }
}

/// Releases the pass guard on drop, including when a pass panics
#[derive(Debug)]
pub(crate) struct PassGuard<'a> {
    scheduler: &'a Scheduler,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.scheduler.in_pass.store(false, Ordering::Release);
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

fn log_shutdown(signal: Result<Signal, broadcast::error::RecvError>) {
    match signal {
        Ok(Signal::Shutdown) => {
            internal!("Reconciliation scheduler received shutdown signal");
        }
        Err(e) => {
            tracing::error!("Reconciliation scheduler shutdown channel error: {e}");
        }
    }
}

/// Drive passes until shutdown
pub(crate) async fn run(service: &ReconcileService, mut shutdown: broadcast::Receiver<Signal>) {
    let scheduler = &service.scheduler;
    let period = service.config.tick_interval();

    'serve: loop {
        if service.queue.is_empty() {
            let notified = scheduler.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            scheduler.set_timer(SchedulerState::Idle);

            // Work may have arrived before the waiter was registered
            if service.queue.is_empty() {
                internal!(level = DEBUG, "Queue empty, reconciliation scheduler idle");
                tokio::select! {
                    () = &mut notified => {}
                    sig = shutdown.recv() => {
                        log_shutdown(sig);
                        break 'serve;
                    }
                }
            }
        }

        internal!(level = DEBUG, "Reconciliation scheduler armed");
        scheduler.set_timer(SchedulerState::Scheduled);
        let mut ticker = ticker(period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    pass::run(service).await;
                    if service.queue.is_empty() {
                        continue 'serve;
                    }
                }
                sig = shutdown.recv() => {
                    log_shutdown(sig);
                    break 'serve;
                }
            }
        }
    }

    scheduler.set_timer(SchedulerState::Idle);
    internal!("Reconciliation scheduler shutdown complete");
}
