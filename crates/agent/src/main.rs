//! `guard-agent` -- replays recorded sensor samples through the security
//! guard.
//!
//! Reads JSON-lines samples from a file or stdin, feeds them to the enabled
//! features and logs every alarm and lifecycle event. Stops at end of input
//! or on Ctrl-C.
//!
//! # Environment variables
//!
//! | Variable            | Required | Default | Description                              |
//! |---------------------|----------|---------|------------------------------------------|
//! | `GUARD_FEATURES`    | no       | `all`   | Comma-separated features to enable       |
//! | `GUARD_REPLAY_FILE` | no       | stdin   | JSON-lines file of samples               |
//! | `GUARD_REPLAY_CLOCK`| no       | `recorded` | `recorded` runs on record timestamps, `live` on the wall clock |
//! | `GUARD_*`           | no       | --      | Guard settings, see `GuardConfig::from_env` |

use std::sync::Arc;

use guard_agent::registry::{parse_feature_list, SecurityGuard};
use guard_agent::replay::{self, ReplayClock};
use guard_core::alarm::AlarmSink;
use guard_core::config::GuardConfig;
use guard_core::feature::SecurityFeature;
use guard_core::scheduler::{ManualScheduler, Scheduler};
use guard_events::{
    EventBus, EventLogger, LogNotifier, LogPlayer, TokioScheduler, WebhookDelivery, WebhookSink,
};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "guard_agent=info,guard_events=info,guard_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GuardConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid guard configuration");
        std::process::exit(1);
    });

    let features = parse_feature_list(&std::env::var("GUARD_FEATURES").unwrap_or_default())
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Invalid GUARD_FEATURES");
            std::process::exit(1);
        });

    let replay_file = std::env::var("GUARD_REPLAY_FILE").ok();
    let live = match std::env::var("GUARD_REPLAY_CLOCK").as_deref() {
        Err(_) | Ok("recorded") => false,
        Ok("live") => true,
        Ok(other) => {
            tracing::error!(value = other, "Invalid GUARD_REPLAY_CLOCK, expected recorded or live");
            std::process::exit(1);
        }
    };

    tracing::info!(
        features = features.len(),
        source = replay_file.as_deref().unwrap_or("stdin"),
        clock = if live { "live" } else { "recorded" },
        "Starting guard-agent",
    );

    let bus = Arc::new(EventBus::default());
    let logger = tokio::spawn(EventLogger::run(bus.subscribe(), CancellationToken::new()));

    // Recorded replays step a manual scheduler to each record's timestamp so
    // response windows end on the same timeline as the cooldown.
    let (scheduler, mut clock, runtime_scheduler) = if live {
        let tokio_scheduler = TokioScheduler::new();
        (
            Arc::new(tokio_scheduler.clone()) as Arc<dyn Scheduler>,
            ReplayClock::live(),
            Some(tokio_scheduler),
        )
    } else {
        let manual = Arc::new(ManualScheduler::new());
        (
            manual.clone() as Arc<dyn Scheduler>,
            ReplayClock::recorded(manual),
            None,
        )
    };

    let mut guard = SecurityGuard::new(config.clone(), scheduler, Arc::clone(&bus))
        .with_notifier(Arc::new(LogNotifier))
        .with_player(Arc::new(LogPlayer::new()));

    if let Some(url) = config.webhook_url.clone() {
        match WebhookDelivery::new() {
            Ok(delivery) => {
                let delivery = Arc::new(delivery);
                let handle = tokio::runtime::Handle::current();
                tracing::info!(url = %url, "Webhook delivery enabled");
                guard = guard.with_sink_factory(Arc::new(move |feature: SecurityFeature| {
                    Arc::new(WebhookSink::new(
                        Arc::clone(&delivery),
                        url.clone(),
                        feature,
                        handle.clone(),
                    )) as Arc<dyn AlarmSink>
                }));
            }
            Err(e) => tracing::warn!(error = %e, "Webhook delivery disabled"),
        }
    }

    for (feature, e) in guard.enable_features(&features) {
        tracing::warn!(feature = %feature, error = %e, "Feature not enabled");
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received, stopping replay");
                cancel.cancel();
            }
        });
    }

    let result = match replay_file {
        Some(path) => match tokio::fs::File::open(&path).await {
            Ok(file) => replay::run(&mut guard, &mut clock, BufReader::new(file), cancel).await,
            Err(e) => {
                tracing::error!(path = %path, error = %e, "Cannot open replay file");
                std::process::exit(1);
            }
        },
        None => {
            replay::run(&mut guard, &mut clock, BufReader::new(tokio::io::stdin()), cancel).await
        }
    };

    match result {
        Ok(stats) => tracing::info!(
            lines = stats.lines,
            readings = stats.readings,
            alarms = stats.alarms,
            skipped = stats.skipped,
            "Replay finished",
        ),
        Err(e) => tracing::error!(error = %e, "Replay aborted"),
    }

    guard.shutdown();
    let flushed = clock.finish();
    if flushed > 0 {
        tracing::debug!(jobs = flushed, "Pending replay jobs run");
    }
    if let Some(runtime_scheduler) = runtime_scheduler {
        runtime_scheduler.shutdown();
    }
    drop(bus);

    if let Ok(logged) = logger.await {
        tracing::debug!(logged, "Event logger drained");
    }
}
