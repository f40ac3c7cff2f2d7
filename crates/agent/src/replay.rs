//! JSON-lines replay driver.
//!
//! Each line is one [`ReplayRecord`]:
//!
//! ```text
//! {"feature":"motion_detection","at":"2026-01-01T00:00:00Z","sample":{"kind":"accelerometer","x":0.1,"y":0.2,"z":9.8}}
//! ```
//!
//! `at` is optional and defaults to the time the line is read. Malformed
//! lines and samples for disabled features are logged and skipped.
//!
//! The [`ReplayClock`] decides which timeline the monitors see. With
//! [`ReplayClock::recorded`] the reading time comes from the records and the
//! scheduler that releases active windows is stepped to the same time, so a
//! file read in milliseconds behaves like the hours it covers.
//! [`ReplayClock::live`] ignores `at` and stamps readings with the wall clock,
//! for samples streamed in as they happen.

use std::sync::Arc;

use chrono::Utc;
use guard_core::feature::SecurityFeature;
use guard_core::scheduler::ManualScheduler;
use guard_core::types::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

use crate::registry::SecurityGuard;
use crate::sources::Sample;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub feature: SecurityFeature,
    pub sample: Sample,
    #[serde(default)]
    pub at: Option<Timestamp>,
}

/// Counters for one replay run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplayStats {
    /// Non-blank lines read.
    pub lines: u64,
    /// Readings evaluated by a monitor.
    pub readings: u64,
    pub alarms: u64,
    /// Lines that could not be parsed or routed.
    pub skipped: u64,
}

// ---------------------------------------------------------------------------
// ReplayClock
// ---------------------------------------------------------------------------

/// Timeline used for reading timestamps and scheduled jobs during a replay.
pub enum ReplayClock {
    /// Reading time is each record's `at`. The scheduler is advanced to it
    /// before the record is fed.
    Recorded {
        scheduler: Arc<ManualScheduler>,
        latest: Option<Timestamp>,
    },
    /// Reading time is the wall clock; jobs run on the guard's own scheduler.
    Live,
}

impl ReplayClock {
    /// Drive `scheduler` from record time. The guard must use the same
    /// scheduler.
    pub fn recorded(scheduler: Arc<ManualScheduler>) -> Self {
        ReplayClock::Recorded {
            scheduler,
            latest: None,
        }
    }

    pub fn live() -> Self {
        ReplayClock::Live
    }

    /// Reading time for a record, running every job that falls due before it.
    ///
    /// Records without `at` are stamped with the wall clock. A record older
    /// than the latest one seen does not move the clock back.
    pub fn reading_time(&mut self, at: Option<Timestamp>) -> Timestamp {
        match self {
            ReplayClock::Live => Utc::now(),
            ReplayClock::Recorded { scheduler, latest } => {
                let at = at.unwrap_or_else(Utc::now);
                match *latest {
                    Some(prev) if at <= prev => {}
                    Some(prev) => {
                        if let Ok(step) = (at - prev).to_std() {
                            scheduler.advance(step);
                        }
                        *latest = Some(at);
                    }
                    None => *latest = Some(at),
                }
                at
            }
        }
    }

    /// Run the jobs still pending at the end of the input, such as sound
    /// stops. Returns how many ran.
    pub fn finish(&self) -> usize {
        match self {
            ReplayClock::Live => 0,
            ReplayClock::Recorded { scheduler, .. } => scheduler.run_all(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Failed to read replay input: {0}")]
    Io(#[from] std::io::Error),
}

/// Feed every record from `reader` into `guard` until EOF or cancellation.
pub async fn run<R>(
    guard: &mut SecurityGuard,
    clock: &mut ReplayClock,
    reader: R,
    cancel: CancellationToken,
) -> Result<ReplayStats, ReplayError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = ReplayStats::default();

    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Replay cancelled");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            tracing::debug!("Replay input exhausted");
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        stats.lines += 1;

        let record: ReplayRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(line = stats.lines, error = %e, "Malformed replay record skipped");
                stats.skipped += 1;
                continue;
            }
        };

        let at = clock.reading_time(record.at);
        match guard.feed(record.feature, &record.sample, at) {
            Ok(outcomes) => {
                stats.readings += outcomes.len() as u64;
                stats.alarms += outcomes.iter().filter(|o| o.fired()).count() as u64;
            }
            Err(e) => {
                tracing::warn!(
                    line = stats.lines,
                    feature = %record.feature,
                    error = %e,
                    "Replay record skipped"
                );
                stats.skipped += 1;
            }
        }
    }

    Ok(stats)
}
