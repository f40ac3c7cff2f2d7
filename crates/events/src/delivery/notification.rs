//! Local notification delivery.

use std::sync::Arc;

use guard_core::alarm::{AlarmEvent, AlarmSink, SinkError};
use guard_core::config::GuardConfig;
use guard_core::feature::notification_title;
use serde::Serialize;

/// Title used for alarms whose rule has no dedicated title.
const DEFAULT_TITLE: &str = "Security Alert";

/// Vibration pattern in milliseconds: wait, buzz, pause, buzz.
pub const VIBRATION_PATTERN_MS: [u64; 4] = [0, 500, 200, 500];

/// A notification ready to be posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    /// Vibration pattern, empty when vibration is disabled.
    pub vibration_ms: Vec<u64>,
}

/// Posts notifications to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), SinkError>;
}

/// [`Notifier`] that writes every notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), SinkError> {
        tracing::info!(
            title = %notification.title,
            message = %notification.message,
            vibrate = !notification.vibration_ms.is_empty(),
            "Notification posted"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// NotificationSink
// ---------------------------------------------------------------------------

/// Turns alarms into notifications.
///
/// When notifications are disabled in the config the sink accepts and drops
/// every alarm.
pub struct NotificationSink {
    notifier: Arc<dyn Notifier>,
    enabled: bool,
    vibrate: bool,
}

impl NotificationSink {
    pub fn new(notifier: Arc<dyn Notifier>, config: &GuardConfig) -> Self {
        Self {
            notifier,
            enabled: config.enable_notifications,
            vibrate: config.vibration_enabled,
        }
    }

    fn build(&self, event: &AlarmEvent) -> Notification {
        Notification {
            title: notification_title(&event.rule)
                .unwrap_or(DEFAULT_TITLE)
                .to_string(),
            message: event.message.clone(),
            vibration_ms: if self.vibrate {
                VIBRATION_PATTERN_MS.to_vec()
            } else {
                Vec::new()
            },
        }
    }
}

impl AlarmSink for NotificationSink {
    fn deliver(&self, event: &AlarmEvent) -> Result<(), SinkError> {
        if !self.enabled {
            return Ok(());
        }
        self.notifier.notify(&self.build(event))
    }
}
