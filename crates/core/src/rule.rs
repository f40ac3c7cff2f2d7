//! Threshold rules: comparator, bound, cooldown and response window.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::reading::ReadingValue;

/// How a reading is compared against a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    /// Fires when the magnitude is strictly above the threshold.
    GreaterThan,
    /// Fires when the magnitude is strictly below the threshold.
    LessThan,
    /// Fires when the magnitude is at or above the threshold.
    AtLeast,
    /// Fires when the magnitude is at or below the threshold.
    AtMost,
    /// Fires on a `true` -> `false` transition.
    EdgeFalling,
    /// Fires on a `false` -> `true` transition.
    EdgeRising,
}

impl Comparator {
    /// Whether this comparator looks at state transitions instead of magnitudes.
    pub fn is_edge(&self) -> bool {
        matches!(self, Comparator::EdgeFalling | Comparator::EdgeRising)
    }

    /// Decide whether `current` satisfies the comparator.
    ///
    /// Edge comparators need a previous reading; with `previous == None` they
    /// never fire.
    pub fn should_fire(
        &self,
        threshold: f64,
        previous: Option<&ReadingValue>,
        current: &ReadingValue,
    ) -> bool {
        match self {
            Comparator::GreaterThan => current.as_magnitude() > threshold,
            Comparator::LessThan => current.as_magnitude() < threshold,
            Comparator::AtLeast => current.as_magnitude() >= threshold,
            Comparator::AtMost => current.as_magnitude() <= threshold,
            Comparator::EdgeFalling => {
                matches!(previous, Some(prev) if prev.as_state()) && !current.as_state()
            }
            Comparator::EdgeRising => {
                matches!(previous, Some(prev) if !prev.as_state()) && current.as_state()
            }
        }
    }
}

/// Placeholder in a rule message replaced by the reading value that fired.
pub const VALUE_PLACEHOLDER: &str = "{value}";

/// Configuration for one monitor. Immutable once attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRule {
    /// Rule identity, carried on every alarm this rule emits.
    pub name: String,
    pub comparator: Comparator,
    /// Caller-defined bound. Not validated; ignored by edge comparators.
    pub threshold: f64,
    /// Minimum time between two alarms. Zero disables debouncing.
    pub cooldown: Duration,
    /// How long the alarm response stays active after a trigger.
    pub response_duration: Duration,
    /// Human-readable alarm message. May contain [`VALUE_PLACEHOLDER`].
    pub message: String,
}

impl ThresholdRule {
    /// Create a magnitude rule with no cooldown and no response window.
    ///
    /// The message defaults to the rule name.
    pub fn new(name: impl Into<String>, comparator: Comparator, threshold: f64) -> Self {
        let name = name.into();
        Self {
            message: name.clone(),
            name,
            comparator,
            threshold,
            cooldown: Duration::ZERO,
            response_duration: Duration::ZERO,
        }
    }

    /// Create an edge rule. The threshold is unused and set to `0.0`.
    pub fn edge(name: impl Into<String>, comparator: Comparator) -> Self {
        Self::new(name, comparator, 0.0)
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_response_duration(mut self, response_duration: Duration) -> Self {
        self.response_duration = response_duration;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}
