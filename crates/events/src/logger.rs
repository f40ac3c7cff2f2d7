//! Structured log of every guard event.
//!
//! [`EventLogger`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! broadcast channel and writes each received [`GuardEvent`] to the tracing
//! log. It runs as a long-lived background task and shuts down gracefully
//! when the bus sender is dropped or the token is cancelled.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::bus::GuardEvent;

/// Background service that logs guard events.
pub struct EventLogger;

impl EventLogger {
    /// Run the logging loop. Returns the number of events logged.
    pub async fn run(
        mut receiver: broadcast::Receiver<GuardEvent>,
        cancel: CancellationToken,
    ) -> u64 {
        let mut logged = 0;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Event logger cancelled");
                    break;
                }
                received = receiver.recv() => match received {
                    Ok(event) => {
                        Self::log(&event);
                        logged += 1;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Event logger lagged, some events were not logged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event bus closed, logger shutting down");
                        break;
                    }
                },
            }
        }
        logged
    }

    fn log(event: &GuardEvent) {
        match event {
            GuardEvent::Alarm { feature, alarm } => tracing::warn!(
                feature = %feature,
                rule = %alarm.rule,
                event_id = %alarm.id,
                message = %alarm.message,
                "Security alarm"
            ),
            GuardEvent::FeatureEnabled { feature, .. } => {
                tracing::info!(feature = %feature, "Feature enabled")
            }
            GuardEvent::FeatureDisabled { feature, .. } => {
                tracing::info!(feature = %feature, "Feature disabled")
            }
            GuardEvent::Error {
                feature, message, ..
            } => tracing::error!(feature = %feature, error = %message, "Feature error"),
        }
    }
}
