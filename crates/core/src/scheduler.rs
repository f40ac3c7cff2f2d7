//! "Run this closure after a delay" collaborator.
//!
//! Monitors use a [`Scheduler`] to release their active window, and the sound
//! response uses one to stop playback. The tokio-backed implementation lives
//! in `guard-events`; [`ManualScheduler`] here is a deterministic clock that
//! only moves when told to, used by tests and offline replays.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A deferred unit of work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs after a delay on some other execution context.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, job: Job) -> ScheduledJob;
}

/// Handle to a scheduled job.
///
/// Dropping the handle leaves the job scheduled; call
/// [`cancel`](ScheduledJob::cancel) to prevent it from running.
pub struct ScheduledJob {
    cancel: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl ScheduledJob {
    /// Wrap the scheduler-specific cancellation action.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Cancel the job. A job that already ran is unaffected.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for ScheduledJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledJob").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ManualScheduler
// ---------------------------------------------------------------------------

struct PendingJob {
    due: Duration,
    seq: u64,
    cancelled: Arc<AtomicBool>,
    job: Job,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_seq: u64,
    pending: Vec<PendingJob>,
}

/// Deterministic scheduler driven by [`advance`](ManualScheduler::advance).
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed on this scheduler's clock.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Number of jobs waiting to run (cancelled jobs excluded).
    pub fn pending(&self) -> usize {
        self.lock()
            .pending
            .iter()
            .filter(|p| !p.cancelled.load(Ordering::Acquire))
            .count()
    }

    /// Move the clock forward by `by` and run every job that became due, in
    /// due order. Returns how many jobs ran.
    ///
    /// Jobs run outside the internal lock, so they may schedule further work.
    pub fn advance(&self, by: Duration) -> usize {
        let due = {
            let mut state = self.lock();
            state.now += by;
            let now = state.now;
            let (mut due, rest): (Vec<_>, Vec<_>) =
                state.pending.drain(..).partition(|p| p.due <= now);
            state.pending = rest;
            due.sort_by_key(|p| (p.due, p.seq));
            due
        };

        let mut ran = 0;
        for pending in due {
            if pending.cancelled.load(Ordering::Acquire) {
                continue;
            }
            (pending.job)();
            ran += 1;
        }
        ran
    }

    /// Run every pending job, including jobs scheduled by other jobs, moving
    /// the clock to each due time in turn. Returns how many jobs ran.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        loop {
            let (now, next_due) = {
                let state = self.lock();
                (state.now, state.pending.iter().map(|p| p.due).min())
            };
            let Some(due) = next_due else {
                return ran;
            };
            ran += self.advance(due.saturating_sub(now));
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, job: Job) -> ScheduledJob {
        let cancelled = Arc::new(AtomicBool::new(false));
        {
            let mut state = self.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            let due = state.now + delay;
            state.pending.push(PendingJob {
                due,
                seq,
                cancelled: Arc::clone(&cancelled),
                job,
            });
        }
        ScheduledJob::new(move || cancelled.store(true, Ordering::Release))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counter_job(counter: &Arc<AtomicUsize>) -> Job {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn jobs_run_only_when_due() {
        let scheduler = ManualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let _job = scheduler.schedule(Duration::from_secs(5), counter_job(&counter));

        assert_eq!(scheduler.advance(Duration::from_secs(4)), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.advance(Duration::from_secs(1)), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn cancelled_jobs_never_run() {
        let scheduler = ManualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let job = scheduler.schedule(Duration::from_secs(1), counter_job(&counter));
        job.cancel();

        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.advance(Duration::from_secs(2)), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropping_the_handle_keeps_the_job() {
        let scheduler = ManualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        drop(scheduler.schedule(Duration::from_secs(1), counter_job(&counter)));

        scheduler.advance(Duration::from_secs(1));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn jobs_run_in_due_order() {
        let scheduler = ManualScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for (label, secs) in [("late", 3), ("early", 1), ("mid", 2)] {
            let order = Arc::clone(&order);
            let _ = scheduler.schedule(
                Duration::from_secs(secs),
                Box::new(move || order.lock().expect("lock").push(label)),
            );
        }

        scheduler.advance(Duration::from_secs(10));
        assert_eq!(*order.lock().expect("lock"), ["early", "mid", "late"]);
    }

    #[test]
    fn run_all_drains_chained_jobs() {
        let scheduler = Arc::new(ManualScheduler::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let chained = {
            let scheduler = Arc::clone(&scheduler);
            let counter = Arc::clone(&counter);
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = scheduler.schedule(Duration::from_secs(2), counter_job(&counter));
            }
        };
        let _ = scheduler.schedule(Duration::from_secs(3), Box::new(chained));
        scheduler
            .schedule(Duration::from_secs(1), counter_job(&counter))
            .cancel();

        assert_eq!(scheduler.run_all(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.now(), Duration::from_secs(5));
        assert_eq!(scheduler.pending(), 0);
    }
}
