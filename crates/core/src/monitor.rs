//! Debounced threshold monitor.
//!
//! Converts a raw reading stream into a rate-limited stream of alarm events.
//! One monitor is bound to one [`ThresholdRule`], one [`AlarmSink`] and one
//! [`Scheduler`]. `feed` takes `&mut self`, so callers serialize readings per
//! instance; the only cross-thread write is the scheduled release of the
//! active flag, which goes through an atomic.
//!
//! Several monitors can share one [`AlarmGate`] when their rules describe the
//! same signal, so an alarm from any of them suppresses the others.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::alarm::{AlarmEvent, AlarmSink, SinkError};
use crate::reading::{Reading, ReadingValue};
use crate::rule::ThresholdRule;
use crate::scheduler::{ScheduledJob, Scheduler};
use crate::types::Timestamp;

/// Why a qualifying reading did not produce an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// A previous alarm response is still in progress.
    Active,
    /// The cooldown since the last alarm has not elapsed.
    Cooldown,
}

/// Result of feeding one reading.
///
/// `feed` never fails; this only reports what happened.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedOutcome {
    /// The rule did not match.
    Idle,
    /// The rule matched but the gate was closed.
    Suppressed(SuppressReason),
    /// An alarm was delivered.
    Fired(AlarmEvent),
    /// An alarm was emitted but the sink failed; the active window was reset.
    DeliveryFailed(AlarmEvent, SinkError),
}

impl FeedOutcome {
    pub fn fired(&self) -> bool {
        matches!(self, FeedOutcome::Fired(_))
    }
}

// ---------------------------------------------------------------------------
// AlarmGate
// ---------------------------------------------------------------------------

/// Active flag and last trigger time of one or more monitors.
///
/// Clones share state. Every monitor starts with its own gate; monitors given
/// the same gate through [`DebouncedMonitor::with_gate`] share one active
/// window and one cooldown.
#[derive(Debug, Clone, Default)]
pub struct AlarmGate {
    /// True while an alarm response is in progress. Cleared by the scheduler.
    active: Arc<AtomicBool>,
    last_trigger: Arc<Mutex<Option<Timestamp>>>,
}

impl AlarmGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn last_trigger(&self) -> Option<Timestamp> {
        *self.lock_trigger()
    }

    fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    fn record_trigger(&self, at: Timestamp) {
        *self.lock_trigger() = Some(at);
    }

    fn lock_trigger(&self) -> std::sync::MutexGuard<'_, Option<Timestamp>> {
        self.last_trigger.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// DebouncedMonitor
// ---------------------------------------------------------------------------

pub struct DebouncedMonitor {
    rule: ThresholdRule,
    sink: Arc<dyn AlarmSink>,
    scheduler: Arc<dyn Scheduler>,
    gate: AlarmGate,
    previous: Option<ReadingValue>,
    pending_release: Option<ScheduledJob>,
}

impl DebouncedMonitor {
    pub fn new(
        rule: ThresholdRule,
        sink: Arc<dyn AlarmSink>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            rule,
            sink,
            scheduler,
            gate: AlarmGate::new(),
            previous: None,
            pending_release: None,
        }
    }

    /// Replace this monitor's own gate with a shared one.
    pub fn with_gate(mut self, gate: AlarmGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn rule(&self) -> &ThresholdRule {
        &self.rule
    }

    /// Whether an alarm response is currently in progress.
    pub fn is_active(&self) -> bool {
        self.gate.is_active()
    }

    /// Timestamp of the last delivered or attempted alarm.
    pub fn last_trigger(&self) -> Option<Timestamp> {
        self.gate.last_trigger()
    }

    /// Feed one reading through the rule and the gate.
    pub fn feed(&mut self, reading: &Reading) -> FeedOutcome {
        let rule = &self.rule;
        let should_fire =
            rule.comparator
                .should_fire(rule.threshold, self.previous.as_ref(), &reading.value);

        let outcome = if !should_fire {
            FeedOutcome::Idle
        } else if let Some(reason) = self.check_gate(reading.recorded_at) {
            tracing::debug!(rule = %self.rule.name, ?reason, "Alarm suppressed");
            FeedOutcome::Suppressed(reason)
        } else {
            self.trigger(reading)
        };

        self.previous = Some(reading.value);
        outcome
    }

    /// Cancel any pending release of the active window.
    ///
    /// Called on drop; exposed so owners can tear down explicitly.
    pub fn shutdown(&mut self) {
        if let Some(job) = self.pending_release.take() {
            job.cancel();
        }
    }

    /// `None` when the gate is open, otherwise the reason it is closed.
    ///
    /// Both conditions are checked independently: an elapsed cooldown does not
    /// override an active response.
    fn check_gate(&self, now: Timestamp) -> Option<SuppressReason> {
        if self.gate.is_active() {
            return Some(SuppressReason::Active);
        }
        match self.gate.last_trigger() {
            None => None,
            Some(last) => match now.signed_duration_since(last).to_std() {
                Ok(elapsed) if elapsed >= self.rule.cooldown => None,
                // Negative elapsed time (out-of-order reading) keeps the gate shut.
                _ => Some(SuppressReason::Cooldown),
            },
        }
    }

    fn trigger(&mut self, reading: &Reading) -> FeedOutcome {
        self.gate.set_active(true);
        self.gate.record_trigger(reading.recorded_at);

        let event = AlarmEvent::new(&self.rule, reading.value, reading.recorded_at);
        let sink = Arc::clone(&self.sink);

        let delivered = catch_unwind(AssertUnwindSafe(|| sink.deliver(&event)))
            .unwrap_or_else(|panic| Err(SinkError::Panicked(panic_message(panic.as_ref()))));

        if let Err(e) = delivered {
            self.gate.set_active(false);
            tracing::warn!(
                rule = %self.rule.name,
                event_id = %event.id,
                error = %e,
                "Alarm delivery failed, active window reset"
            );
            return FeedOutcome::DeliveryFailed(event, e);
        }

        tracing::info!(
            rule = %self.rule.name,
            event_id = %event.id,
            message = %event.message,
            "Alarm fired"
        );
        self.schedule_release();
        FeedOutcome::Fired(event)
    }

    fn schedule_release(&mut self) {
        if let Some(stale) = self.pending_release.take() {
            stale.cancel();
        }

        if self.rule.response_duration.is_zero() {
            self.gate.set_active(false);
            return;
        }

        let gate = self.gate.clone();
        let job = self.scheduler.schedule(
            self.rule.response_duration,
            Box::new(move || gate.set_active(false)),
        );
        self.pending_release = Some(job);
    }
}

impl Drop for DebouncedMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for DebouncedMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebouncedMonitor")
            .field("rule", &self.rule)
            .field("active", &self.is_active())
            .field("last_trigger", &self.last_trigger())
            .field("previous", &self.previous)
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::rule::Comparator;
    use crate::scheduler::ManualScheduler;

    /// Reading timestamp `ms` milliseconds after a fixed epoch.
    fn at(ms: i64) -> Timestamp {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms)
            .single()
            .expect("valid timestamp")
    }

    fn magnitude(value: f64, ms: i64) -> Reading {
        Reading::magnitude(value, at(ms))
    }

    fn state(value: bool, ms: i64) -> Reading {
        Reading::state(value, at(ms))
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<AlarmEvent>>,
    }

    impl RecordingSink {
        fn count(&self) -> usize {
            self.events.lock().expect("lock").len()
        }
    }

    impl AlarmSink for RecordingSink {
        fn deliver(&self, event: &AlarmEvent) -> Result<(), SinkError> {
            self.events.lock().expect("lock").push(event.clone());
            Ok(())
        }
    }

    fn monitor(rule: ThresholdRule) -> (DebouncedMonitor, Arc<RecordingSink>, Arc<ManualScheduler>) {
        let sink = Arc::new(RecordingSink::default());
        let scheduler = Arc::new(ManualScheduler::new());
        let m = DebouncedMonitor::new(rule, sink.clone(), scheduler.clone());
        (m, sink, scheduler)
    }

    fn motion_rule() -> ThresholdRule {
        ThresholdRule::new("motion.detected", Comparator::GreaterThan, 600.0)
            .with_cooldown(Duration::from_millis(10_000))
            .with_response_duration(Duration::from_millis(5_000))
            .with_message("Motion detected!")
    }

    #[test]
    fn reading_equal_to_threshold_never_fires() {
        let (mut m, sink, _) = monitor(ThresholdRule::new("gt", Comparator::GreaterThan, 600.0));
        assert_eq!(m.feed(&magnitude(600.0, 0)), FeedOutcome::Idle);

        let (mut m, _, _) = monitor(ThresholdRule::new("lt", Comparator::LessThan, 5.0));
        assert_eq!(m.feed(&magnitude(5.0, 0)), FeedOutcome::Idle);

        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn cooldown_scenario_fires_suppresses_then_fires_again() {
        let (mut m, sink, scheduler) = monitor(motion_rule());

        let first = m.feed(&magnitude(601.0, 0));
        assert_matches!(first, FeedOutcome::Fired(ref e) if e.message == "Motion detected!");
        assert!(m.is_active());

        // Response window ends at t=5000.
        scheduler.advance(Duration::from_millis(5_000));
        assert!(!m.is_active());

        assert_eq!(
            m.feed(&magnitude(601.0, 5_000)),
            FeedOutcome::Suppressed(SuppressReason::Cooldown)
        );

        assert!(m.feed(&magnitude(601.0, 11_000)).fired());
        assert_eq!(sink.count(), 2);
        assert_eq!(m.last_trigger(), Some(at(11_000)));
    }

    #[test]
    fn at_most_one_alarm_per_cooldown_window() {
        let (mut m, sink, scheduler) = monitor(motion_rule());

        // Feed every 500 ms for 30 s, releasing the active window as time passes.
        for step in 0..60 {
            let t = step * 500;
            m.feed(&magnitude(900.0, t));
            scheduler.advance(Duration::from_millis(500));
        }

        let events = sink.events.lock().expect("lock");
        assert_eq!(events.len(), 3);
        for pair in events.windows(2) {
            let gap = pair[1].triggered_at - pair[0].triggered_at;
            assert!(gap >= chrono::Duration::milliseconds(10_000));
        }
    }

    #[test]
    fn active_window_blocks_even_after_cooldown_elapsed() {
        let rule = ThresholdRule::new("clap.detected", Comparator::GreaterThan, 6500.0)
            .with_cooldown(Duration::from_millis(1_000))
            .with_response_duration(Duration::from_millis(60_000));
        let (mut m, sink, scheduler) = monitor(rule);

        assert!(m.feed(&magnitude(7000.0, 0)).fired());
        assert_eq!(
            m.feed(&magnitude(7000.0, 5_000)),
            FeedOutcome::Suppressed(SuppressReason::Active)
        );

        scheduler.advance(Duration::from_millis(60_000));
        assert!(m.feed(&magnitude(7000.0, 61_000)).fired());
        assert_eq!(sink.count(), 2);
    }

    #[test]
    fn edge_rules_never_fire_on_first_reading() {
        let (mut falling, _, _) = monitor(ThresholdRule::edge("f", Comparator::EdgeFalling));
        assert_eq!(falling.feed(&state(false, 0)), FeedOutcome::Idle);

        let (mut rising, _, _) = monitor(ThresholdRule::edge("r", Comparator::EdgeRising));
        assert_eq!(rising.feed(&state(true, 0)), FeedOutcome::Idle);
    }

    #[test]
    fn edge_falling_fires_once_on_disconnect() {
        let rule = ThresholdRule::edge("charger.disconnected", Comparator::EdgeFalling)
            .with_cooldown(Duration::from_millis(10_000))
            .with_message("disconnected");
        let (mut m, sink, _) = monitor(rule);

        assert_eq!(m.feed(&state(true, 0)), FeedOutcome::Idle);
        assert_matches!(m.feed(&state(false, 1)), FeedOutcome::Fired(ref e) if e.message == "disconnected");
        assert_eq!(m.feed(&state(false, 2)), FeedOutcome::Idle);
        assert_eq!(sink.count(), 1);
    }

    #[test]
    fn suppressed_readings_still_update_previous() {
        let rule = ThresholdRule::edge("wifi.lost", Comparator::EdgeFalling)
            .with_cooldown(Duration::from_millis(10_000));
        let (mut m, sink, _) = monitor(rule);

        m.feed(&state(true, 0));
        assert!(m.feed(&state(false, 100)).fired());
        m.feed(&state(true, 200));
        // Falling edge inside the cooldown is suppressed...
        assert_eq!(
            m.feed(&state(false, 300)),
            FeedOutcome::Suppressed(SuppressReason::Cooldown)
        );
        // ...and the previous reading is now `false`, so no edge is pending.
        assert_eq!(m.feed(&state(false, 20_000)), FeedOutcome::Idle);
        assert_eq!(sink.count(), 1);
    }

    #[test]
    fn zero_cooldown_fires_on_every_qualifying_reading() {
        let rule = ThresholdRule::new("battery.low", Comparator::AtMost, 15.0);
        let (mut m, sink, _) = monitor(rule);

        for t in 0..5 {
            assert!(m.feed(&magnitude(10.0, t)).fired());
        }
        assert_eq!(sink.count(), 5);
        assert!(!m.is_active());
    }

    #[test]
    fn failing_sink_resets_active_and_recovers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sink_calls = Arc::clone(&calls);
        let sink = move |_: &AlarmEvent| -> Result<(), SinkError> {
            if sink_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(SinkError::Unavailable("speaker busy".into()))
            } else {
                Ok(())
            }
        };
        let rule = ThresholdRule::new("proximity.near", Comparator::LessThan, 5.0)
            .with_cooldown(Duration::from_millis(3_000))
            .with_response_duration(Duration::from_millis(3_000));
        let scheduler = Arc::new(ManualScheduler::new());
        let mut m = DebouncedMonitor::new(rule, Arc::new(sink), scheduler.clone());

        assert_matches!(m.feed(&magnitude(1.0, 0)), FeedOutcome::DeliveryFailed(_, SinkError::Unavailable(_)));
        assert!(!m.is_active());
        assert_eq!(scheduler.pending(), 0);

        assert!(m.feed(&magnitude(1.0, 3_000)).fired());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_sink_is_caught() {
        let sink = |_: &AlarmEvent| -> Result<(), SinkError> { panic!("notification service gone") };
        let rule = ThresholdRule::new("motion.detected", Comparator::GreaterThan, 600.0)
            .with_response_duration(Duration::from_millis(5_000));
        let mut m = DebouncedMonitor::new(rule, Arc::new(sink), Arc::new(ManualScheduler::new()));

        assert_matches!(
            m.feed(&magnitude(700.0, 0)),
            FeedOutcome::DeliveryFailed(_, SinkError::Panicked(msg)) if msg == "notification service gone"
        );
        assert!(!m.is_active());
    }

    #[test]
    fn out_of_order_reading_keeps_trigger_time_monotonic() {
        let (mut m, _, scheduler) = monitor(motion_rule());

        assert!(m.feed(&magnitude(700.0, 20_000)).fired());
        scheduler.advance(Duration::from_millis(5_000));
        assert_eq!(
            m.feed(&magnitude(700.0, 0)),
            FeedOutcome::Suppressed(SuppressReason::Cooldown)
        );
        assert_eq!(m.last_trigger(), Some(at(20_000)));
    }

    #[test]
    fn shared_gate_suppresses_sibling_rules() {
        let sink = Arc::new(RecordingSink::default());
        let scheduler = Arc::new(ManualScheduler::new());
        let gate = AlarmGate::new();
        let rule = |name: &str, comparator| {
            ThresholdRule::edge(name, comparator)
                .with_cooldown(Duration::from_millis(10_000))
                .with_response_duration(Duration::from_millis(5_000))
        };
        let mut lost = DebouncedMonitor::new(
            rule("wifi.lost", Comparator::EdgeFalling),
            sink.clone(),
            scheduler.clone(),
        )
        .with_gate(gate.clone());
        let mut connected = DebouncedMonitor::new(
            rule("wifi.connected", Comparator::EdgeRising),
            sink.clone(),
            scheduler.clone(),
        )
        .with_gate(gate.clone());

        for m in [&mut lost, &mut connected] {
            m.feed(&state(true, 0));
        }
        assert!(lost.feed(&state(false, 1_000)).fired());
        assert!(connected.is_active());

        connected.feed(&state(false, 1_000));
        assert_eq!(
            connected.feed(&state(true, 2_000)),
            FeedOutcome::Suppressed(SuppressReason::Active)
        );

        scheduler.advance(Duration::from_millis(5_000));
        assert!(!gate.is_active());
        connected.feed(&state(false, 7_000));
        assert_eq!(
            connected.feed(&state(true, 8_000)),
            FeedOutcome::Suppressed(SuppressReason::Cooldown)
        );

        connected.feed(&state(false, 11_000));
        assert!(connected.feed(&state(true, 11_500)).fired());
        assert_eq!(lost.last_trigger(), Some(at(11_500)));
        assert_eq!(sink.count(), 2);
    }

    #[test]
    fn shutdown_cancels_pending_release() {
        let (mut m, _, scheduler) = monitor(motion_rule());
        assert!(m.feed(&magnitude(700.0, 0)).fired());
        assert_eq!(scheduler.pending(), 1);

        m.shutdown();
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn drop_cancels_pending_release() {
        let (mut m, _, scheduler) = monitor(motion_rule());
        m.feed(&magnitude(700.0, 0));
        drop(m);
        assert_eq!(scheduler.pending(), 0);
    }
}
