//! Guard settings, read once when a feature's monitors are built.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// User-tunable settings shared by every feature.
///
/// Sensitivities are passed to the rules unchecked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Post a notification for each alarm.
    pub enable_notifications: bool,
    /// Sound to play instead of the platform alarm tone.
    pub custom_alarm_sound: Option<String>,
    /// Length of the clap and motion alarm response in milliseconds.
    pub alarm_duration_ms: u64,
    /// Shake speed above which motion fires (nominal range 100-1000).
    pub motion_sensitivity: i32,
    /// RMS energy above which a clap fires (nominal range 5000-10000).
    pub clap_sensitivity: i32,
    /// Battery percentage at or below which the low-battery alarm fires.
    pub low_battery_threshold: i32,
    pub vibration_enabled: bool,
    /// Proximity distance below which an object counts as nearby.
    pub proximity_max_range: f64,
    /// Optional endpoint receiving every alarm as JSON.
    pub webhook_url: Option<String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            enable_notifications: true,
            custom_alarm_sound: None,
            alarm_duration_ms: 5_000,
            motion_sensitivity: 600,
            clap_sensitivity: 6_500,
            low_battery_threshold: 15,
            vibration_enabled: true,
            proximity_max_range: 5.0,
            webhook_url: None,
        }
    }
}

impl GuardConfig {
    pub fn alarm_duration(&self) -> Duration {
        Duration::from_millis(self.alarm_duration_ms)
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default |
    /// |-------------------------------|---------|
    /// | `GUARD_ENABLE_NOTIFICATIONS`  | `true`  |
    /// | `GUARD_ALARM_SOUND`           | unset   |
    /// | `GUARD_ALARM_DURATION_MS`     | `5000`  |
    /// | `GUARD_MOTION_SENSITIVITY`    | `600`   |
    /// | `GUARD_CLAP_SENSITIVITY`      | `6500`  |
    /// | `GUARD_LOW_BATTERY_THRESHOLD` | `15`    |
    /// | `GUARD_VIBRATION_ENABLED`     | `true`  |
    /// | `GUARD_PROXIMITY_MAX_RANGE`   | `5.0`   |
    /// | `GUARD_WEBHOOK_URL`           | unset   |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            enable_notifications: parse_or(
                &lookup,
                "GUARD_ENABLE_NOTIFICATIONS",
                defaults.enable_notifications,
            )?,
            custom_alarm_sound: non_empty("GUARD_ALARM_SOUND"),
            alarm_duration_ms: parse_or(&lookup, "GUARD_ALARM_DURATION_MS", defaults.alarm_duration_ms)?,
            motion_sensitivity: parse_or(
                &lookup,
                "GUARD_MOTION_SENSITIVITY",
                defaults.motion_sensitivity,
            )?,
            clap_sensitivity: parse_or(&lookup, "GUARD_CLAP_SENSITIVITY", defaults.clap_sensitivity)?,
            low_battery_threshold: parse_or(
                &lookup,
                "GUARD_LOW_BATTERY_THRESHOLD",
                defaults.low_battery_threshold,
            )?,
            vibration_enabled: parse_or(
                &lookup,
                "GUARD_VIBRATION_ENABLED",
                defaults.vibration_enabled,
            )?,
            proximity_max_range: parse_or(
                &lookup,
                "GUARD_PROXIMITY_MAX_RANGE",
                defaults.proximity_max_range,
            )?,
            webhook_url: non_empty("GUARD_WEBHOOK_URL"),
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, CoreError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CoreError::Config(format!("{key} has invalid value {raw:?}"))),
    }
}
