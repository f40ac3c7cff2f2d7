//! Timestamped samples fed into a monitor.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// The value carried by a [`Reading`].
///
/// Serialized untagged so a replay file can write `601.0` or `true` directly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReadingValue {
    /// A scalar sample (RMS energy, shake speed, battery percent, distance).
    Magnitude(f64),
    /// A binary state sample (charging, Wi-Fi connected, headset plugged).
    State(bool),
}

impl ReadingValue {
    /// The value as a magnitude. Boolean states map to `1.0` / `0.0`.
    pub fn as_magnitude(&self) -> f64 {
        match *self {
            ReadingValue::Magnitude(v) => v,
            ReadingValue::State(true) => 1.0,
            ReadingValue::State(false) => 0.0,
        }
    }

    /// The value as a boolean state. Magnitudes are `true` when non-zero.
    pub fn as_state(&self) -> bool {
        match *self {
            ReadingValue::Magnitude(v) => v != 0.0,
            ReadingValue::State(s) => s,
        }
    }
}

impl fmt::Display for ReadingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingValue::Magnitude(v) => write!(f, "{v}"),
            ReadingValue::State(s) => write!(f, "{s}"),
        }
    }
}

/// One timestamped sample from a monitored source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub value: ReadingValue,
    pub recorded_at: Timestamp,
}

impl Reading {
    /// A scalar reading.
    pub fn magnitude(value: f64, recorded_at: Timestamp) -> Self {
        Self {
            value: ReadingValue::Magnitude(value),
            recorded_at,
        }
    }

    /// A boolean state reading.
    pub fn state(value: bool, recorded_at: Timestamp) -> Self {
        Self {
            value: ReadingValue::State(value),
            recorded_at,
        }
    }
}
