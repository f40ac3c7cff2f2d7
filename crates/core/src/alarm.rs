//! Alarm events and the sink they are delivered to.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reading::ReadingValue;
use crate::rule::{ThresholdRule, VALUE_PLACEHOLDER};
use crate::types::Timestamp;

/// An alarm emitted by a monitor when its rule fires and the gate is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmEvent {
    pub id: Uuid,
    /// Name of the [`ThresholdRule`] that fired.
    pub rule: String,
    pub message: String,
    /// The reading value that satisfied the rule.
    pub value: ReadingValue,
    /// Timestamp of the reading that fired.
    pub triggered_at: Timestamp,
}

impl AlarmEvent {
    /// Build the event for `rule` firing on `value` at `triggered_at`.
    pub fn new(rule: &ThresholdRule, value: ReadingValue, triggered_at: Timestamp) -> Self {
        Self {
            id: Uuid::now_v7(),
            rule: rule.name.clone(),
            message: rule.message.replace(VALUE_PLACEHOLDER, &value.to_string()),
            value,
            triggered_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Error returned by an [`AlarmSink`] that could not take an alarm.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("Alarm rejected: {0}")]
    Rejected(String),

    #[error("Alarm output unavailable: {0}")]
    Unavailable(String),

    #[error("Alarm sink panicked: {0}")]
    Panicked(String),
}

/// Receiver of alarm events.
///
/// Called synchronously from `feed`, so implementations must return quickly
/// and hand any slow work (playback, network) to another execution context.
/// May be invoked repeatedly; each call must be safe on its own.
pub trait AlarmSink: Send + Sync {
    fn deliver(&self, event: &AlarmEvent) -> Result<(), SinkError>;
}

impl<F> AlarmSink for F
where
    F: Fn(&AlarmEvent) -> Result<(), SinkError> + Send + Sync,
{
    fn deliver(&self, event: &AlarmEvent) -> Result<(), SinkError> {
        self(event)
    }
}
