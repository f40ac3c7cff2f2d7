//! Tokio-backed [`Scheduler`].
//!
//! Each job is a spawned task that sleeps for the delay and then runs the
//! closure, unless its [`CancellationToken`] fires first.

use std::time::Duration;

use guard_core::scheduler::{Job, ScheduledJob, Scheduler};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Runs delayed jobs on a tokio runtime.
///
/// Captures the runtime handle at construction so jobs can be scheduled from
/// threads that are not themselves inside the runtime.
#[derive(Clone)]
pub struct TokioScheduler {
    handle: Handle,
    /// Parent token; cancelling it cancels every job scheduled here.
    shutdown: CancellationToken,
}

impl TokioScheduler {
    /// Create a scheduler bound to the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new() -> Self {
        Self::with_handle(Handle::current())
    }

    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancel every job that has not run yet.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, job: Job) -> ScheduledJob {
        let token = self.shutdown.child_token();
        let task_token = token.clone();
        let deadline = tokio::time::Instant::now() + delay;

        self.handle.spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {
                    tracing::trace!("Scheduled job cancelled");
                }
                _ = tokio::time::sleep_until(deadline) => job(),
            }
        });

        ScheduledJob::new(move || token.cancel())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;

    fn flag_job(flag: &Arc<AtomicBool>) -> Job {
        let flag = Arc::clone(flag);
        Box::new(move || flag.store(true, Ordering::SeqCst))
    }

    /// Let spawned tasks observe the advanced clock.
    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn job_runs_after_delay() {
        let scheduler = TokioScheduler::new();
        let ran = Arc::new(AtomicBool::new(false));
        let _job = scheduler.schedule(Duration::from_secs(5), flag_job(&ran));

        tokio::time::advance(Duration::from_secs(4)).await;
        settle().await;
        assert!(!ran.load(Ordering::SeqCst));

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_job_does_not_run() {
        let scheduler = TokioScheduler::new();
        let ran = Arc::new(AtomicBool::new(false));
        let job = scheduler.schedule(Duration::from_secs(1), flag_job(&ran));
        job.cancel();

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_all_jobs() {
        let scheduler = TokioScheduler::new();
        let a = Arc::new(AtomicBool::new(false));
        let b = Arc::new(AtomicBool::new(false));
        let _ja = scheduler.schedule(Duration::from_secs(1), flag_job(&a));
        let _jb = scheduler.schedule(Duration::from_secs(3), flag_job(&b));

        scheduler.shutdown();
        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert!(!a.load(Ordering::SeqCst));
        assert!(!b.load(Ordering::SeqCst));
    }
}
