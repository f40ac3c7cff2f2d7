//! Replays wired the way the `guard-agent` binary wires them.

use std::sync::Arc;

use guard_agent::registry::SecurityGuard;
use guard_agent::replay::{self, ReplayClock, ReplayStats};
use guard_core::config::GuardConfig;
use guard_core::feature::SecurityFeature;
use guard_core::scheduler::ManualScheduler;
use guard_events::{EventBus, GuardEvent, LogNotifier, LogPlayer, TokioScheduler};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const NEAR_EVERY_FEW_SECONDS: &str = concat!(
    r#"{"feature":"proximity_detection","at":"2026-01-01T00:00:00Z","sample":{"kind":"proximity","distance":1.0}}"#,
    "\n",
    r#"{"feature":"proximity_detection","at":"2026-01-01T00:00:02Z","sample":{"kind":"proximity","distance":1.0}}"#,
    "\n",
    r#"{"feature":"proximity_detection","at":"2026-01-01T00:00:04Z","sample":{"kind":"proximity","distance":1.0}}"#,
    "\n",
    r#"{"feature":"proximity_detection","at":"2026-01-01T00:01:00Z","sample":{"kind":"proximity","distance":1.0}}"#,
    "\n",
);

fn alarms(events: &mut broadcast::Receiver<GuardEvent>) -> usize {
    std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| matches!(e, GuardEvent::Alarm { .. }))
        .count()
}

#[tokio::test]
async fn recorded_clock_releases_on_record_time() {
    let scheduler = Arc::new(ManualScheduler::new());
    let player = Arc::new(LogPlayer::new());
    let bus = Arc::new(EventBus::default());
    let mut events = bus.subscribe();
    let mut guard = SecurityGuard::new(GuardConfig::default(), scheduler.clone(), bus)
        .with_notifier(Arc::new(LogNotifier))
        .with_player(player.clone());
    guard
        .enable_feature(SecurityFeature::ProximityDetection)
        .expect("proximity enables");

    let mut clock = ReplayClock::recorded(scheduler.clone());
    let stats = replay::run(
        &mut guard,
        &mut clock,
        NEAR_EVERY_FEW_SECONDS.as_bytes(),
        CancellationToken::new(),
    )
    .await
    .expect("in-memory input never fails");

    // 00:00:02 falls inside the first 3 s response; 00:00:04 is past it.
    assert_eq!(
        stats,
        ReplayStats {
            lines: 4,
            readings: 4,
            alarms: 3,
            skipped: 0,
        }
    );
    assert_eq!(alarms(&mut events), 3);

    guard.shutdown();
    assert_eq!(clock.finish(), 1);
    assert_eq!(player.playing(), 0);
    assert_eq!(scheduler.pending(), 0);
}

#[tokio::test]
async fn recorded_clock_keeps_wifi_sharing_one_window() {
    let scheduler = Arc::new(ManualScheduler::new());
    let bus = Arc::new(EventBus::default());
    let mut guard = SecurityGuard::new(GuardConfig::default(), scheduler.clone(), bus);
    guard
        .enable_feature(SecurityFeature::WifiMonitor)
        .expect("wifi enables");

    let input = concat!(
        r#"{"feature":"wifi_monitor","at":"2026-01-01T00:00:00Z","sample":{"kind":"connectivity","wifi":true}}"#,
        "\n",
        r#"{"feature":"wifi_monitor","at":"2026-01-01T00:00:01Z","sample":{"kind":"connectivity","wifi":false}}"#,
        "\n",
        r#"{"feature":"wifi_monitor","at":"2026-01-01T00:00:03Z","sample":{"kind":"connectivity","wifi":true}}"#,
        "\n",
        r#"{"feature":"wifi_monitor","at":"2026-01-01T00:00:20Z","sample":{"kind":"connectivity","wifi":false}}"#,
        "\n",
    );

    let mut clock = ReplayClock::recorded(scheduler);
    let stats = replay::run(&mut guard, &mut clock, input.as_bytes(), CancellationToken::new())
        .await
        .expect("in-memory input never fails");

    // Lost at 1 s, reconnect at 3 s suppressed, lost again at 20 s.
    assert_eq!(stats.readings, 8);
    assert_eq!(stats.alarms, 2);
}

#[tokio::test]
async fn live_clock_ignores_record_timestamps() {
    let scheduler = TokioScheduler::new();
    let bus = Arc::new(EventBus::default());
    let mut guard = SecurityGuard::new(GuardConfig::default(), Arc::new(scheduler.clone()), bus);
    guard
        .enable_feature(SecurityFeature::ProximityDetection)
        .expect("proximity enables");

    let mut clock = ReplayClock::live();
    let stats = replay::run(
        &mut guard,
        &mut clock,
        NEAR_EVERY_FEW_SECONDS.as_bytes(),
        CancellationToken::new(),
    )
    .await
    .expect("in-memory input never fails");

    // All four lines arrive within one wall-clock response window.
    assert_eq!(stats.readings, 4);
    assert_eq!(stats.alarms, 1);

    guard.shutdown();
    scheduler.shutdown();
}
