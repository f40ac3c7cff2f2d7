//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the central publish/subscribe hub for [`GuardEvent`]s.
//! It is designed to be shared via `Arc<EventBus>` across the application.

use chrono::{DateTime, Utc};
use guard_core::alarm::AlarmEvent;
use guard_core::feature::SecurityFeature;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// GuardEvent
// ---------------------------------------------------------------------------

/// Something that happened in the guard: an alarm or a feature lifecycle change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GuardEvent {
    /// A monitor fired.
    Alarm {
        feature: SecurityFeature,
        alarm: AlarmEvent,
    },
    FeatureEnabled {
        feature: SecurityFeature,
        at: DateTime<Utc>,
    },
    FeatureDisabled {
        feature: SecurityFeature,
        at: DateTime<Utc>,
    },
    /// A feature could not be enabled or an alarm could not be delivered.
    Error {
        feature: SecurityFeature,
        message: String,
        at: DateTime<Utc>,
    },
}

impl GuardEvent {
    pub fn enabled(feature: SecurityFeature) -> Self {
        GuardEvent::FeatureEnabled {
            feature,
            at: Utc::now(),
        }
    }

    pub fn disabled(feature: SecurityFeature) -> Self {
        GuardEvent::FeatureDisabled {
            feature,
            at: Utc::now(),
        }
    }

    pub fn error(feature: SecurityFeature, message: impl Into<String>) -> Self {
        GuardEvent::Error {
            feature,
            message: message.into(),
            at: Utc::now(),
        }
    }

    /// The feature this event concerns.
    pub fn feature(&self) -> SecurityFeature {
        match self {
            GuardEvent::Alarm { feature, .. }
            | GuardEvent::FeatureEnabled { feature, .. }
            | GuardEvent::FeatureDisabled { feature, .. }
            | GuardEvent::Error { feature, .. } => *feature,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`GuardEvent`].
///
/// # Usage
///
/// ```rust
/// use guard_core::feature::SecurityFeature;
/// use guard_events::bus::{EventBus, GuardEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(GuardEvent::enabled(SecurityFeature::MotionDetection));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<GuardEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Never blocks. If there are no active subscribers the event is dropped.
    pub fn publish(&self, event: GuardEvent) {
        // Ignore the SendError; it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<GuardEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
