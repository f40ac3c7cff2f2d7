//! Reading sources.
//!
//! Raw platform samples (battery broadcasts, sensor events, microphone
//! buffers, connectivity callbacks) arrive as [`Sample`]s. A
//! [`FeatureSource`] turns them into readings for the rules of one feature,
//! doing whatever per-source preprocessing the feature needs.

use std::time::Duration;

use guard_core::config::GuardConfig;
use guard_core::error::CoreError;
use guard_core::feature::{
    SecurityFeature, RULE_BATTERY_FULL, RULE_BATTERY_LOW, RULE_CHARGER_DISCONNECTED,
    RULE_CLAP_DETECTED, RULE_HANDSFREE_DISCONNECTED, RULE_MOTION_DETECTED, RULE_PROXIMITY_NEAR,
    RULE_WIFI_CONNECTED, RULE_WIFI_LOST,
};
use guard_core::reading::Reading;
use guard_core::signal::{battery_percent, rms, MotionTracker};
use guard_core::types::Timestamp;
use serde::{Deserialize, Serialize};

/// Minimum spacing between two loud microphone buffers forwarded as claps.
const CLAP_REARM: Duration = Duration::from_millis(1_000);

/// A raw sample from one platform signal source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Sample {
    /// Battery status broadcast.
    Battery {
        level: i32,
        scale: i32,
        charging: bool,
    },
    /// Power connection state.
    Charger { charging: bool },
    /// Whether Wi-Fi is the connected transport.
    Connectivity { wifi: bool },
    /// One microphone buffer of 16-bit PCM.
    Audio { samples: Vec<i16> },
    /// Accelerometer vector in m/s^2.
    Accelerometer { x: f64, y: f64, z: f64 },
    /// Proximity sensor distance.
    Proximity { distance: f64 },
    /// Headset plug state.
    Headset { plugged: bool },
}

impl Sample {
    pub fn kind(&self) -> &'static str {
        match self {
            Sample::Battery { .. } => "battery",
            Sample::Charger { .. } => "charger",
            Sample::Connectivity { .. } => "connectivity",
            Sample::Audio { .. } => "audio",
            Sample::Accelerometer { .. } => "accelerometer",
            Sample::Proximity { .. } => "proximity",
            Sample::Headset { .. } => "headset",
        }
    }
}

// ---------------------------------------------------------------------------
// Availability
// ---------------------------------------------------------------------------

/// Reports whether the signal source behind a feature can be used.
///
/// A missing sensor or a denied permission is reported here, before any
/// monitor is built.
pub trait SourceProbe: Send + Sync {
    fn probe(&self, feature: SecurityFeature) -> Result<(), String>;
}

/// Probe for hosts where every source is simulated.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllSourcesAvailable;

impl SourceProbe for AllSourcesAvailable {
    fn probe(&self, _feature: SecurityFeature) -> Result<(), String> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FeatureSource
// ---------------------------------------------------------------------------

/// Per-feature sample preprocessing.
#[derive(Debug, Clone)]
pub struct FeatureSource {
    feature: SecurityFeature,
    motion: MotionTracker,
    clap_threshold: f64,
    last_clap: Option<Timestamp>,
}

impl FeatureSource {
    pub fn new(feature: SecurityFeature, config: &GuardConfig) -> Self {
        Self {
            feature,
            motion: MotionTracker::new(),
            clap_threshold: f64::from(config.clap_sensitivity),
            last_clap: None,
        }
    }

    pub fn feature(&self) -> SecurityFeature {
        self.feature
    }

    /// Convert a sample into `(rule name, reading)` pairs.
    ///
    /// An empty result means the sample was consumed without producing a
    /// reading (baseline sample, rate-limited buffer, unknown battery level).
    pub fn readings(
        &mut self,
        sample: &Sample,
        at: Timestamp,
    ) -> Result<Vec<(&'static str, Reading)>, CoreError> {
        let readings = match (self.feature, sample) {
            (SecurityFeature::ChargerDetection, Sample::Charger { charging })
            | (SecurityFeature::ChargerDetection, Sample::Battery { charging, .. }) => {
                vec![(RULE_CHARGER_DISCONNECTED, Reading::state(*charging, at))]
            }
            (
                SecurityFeature::BatteryMonitor,
                Sample::Battery {
                    level,
                    scale,
                    charging,
                },
            ) => battery_readings(*level, *scale, *charging, at),
            (SecurityFeature::WifiMonitor, Sample::Connectivity { wifi }) => vec![
                (RULE_WIFI_LOST, Reading::state(*wifi, at)),
                (RULE_WIFI_CONNECTED, Reading::state(*wifi, at)),
            ],
            (SecurityFeature::ClapDetection, Sample::Audio { samples }) => {
                self.clap_reading(rms(samples), at).into_iter().collect()
            }
            (SecurityFeature::MotionDetection, Sample::Accelerometer { x, y, z }) => self
                .motion
                .sample(*x, *y, *z, at)
                .map(|speed| (RULE_MOTION_DETECTED, Reading::magnitude(speed, at)))
                .into_iter()
                .collect(),
            (SecurityFeature::ProximityDetection, Sample::Proximity { distance }) => {
                vec![(RULE_PROXIMITY_NEAR, Reading::magnitude(*distance, at))]
            }
            (SecurityFeature::HandsfreeDetection, Sample::Headset { plugged }) => {
                vec![(RULE_HANDSFREE_DISCONNECTED, Reading::state(*plugged, at))]
            }
            (feature, sample) => {
                return Err(CoreError::SampleMismatch {
                    feature,
                    kind: sample.kind(),
                })
            }
        };
        Ok(readings)
    }

    /// Loud buffers are forwarded at most once per [`CLAP_REARM`]; quiet ones
    /// always pass so the monitor sees the full stream.
    fn clap_reading(&mut self, energy: f64, at: Timestamp) -> Option<(&'static str, Reading)> {
        if energy > self.clap_threshold {
            let rearmed = match self.last_clap {
                None => true,
                Some(last) => matches!((at - last).to_std(), Ok(gap) if gap > CLAP_REARM),
            };
            if !rearmed {
                return None;
            }
            self.last_clap = Some(at);
        }
        Some((RULE_CLAP_DETECTED, Reading::magnitude(energy, at)))
    }
}

/// Battery full is only evaluated while charging; low is evaluated whenever
/// the battery is not full-and-charging.
fn battery_readings(
    level: i32,
    scale: i32,
    charging: bool,
    at: Timestamp,
) -> Vec<(&'static str, Reading)> {
    let Some(percent) = battery_percent(level, scale) else {
        tracing::debug!(level, scale, "Battery level unknown, sample ignored");
        return Vec::new();
    };

    let full = charging && percent >= 100.0;
    let mut readings = Vec::with_capacity(2);
    if charging {
        readings.push((RULE_BATTERY_FULL, Reading::magnitude(percent, at)));
    }
    if !full {
        readings.push((RULE_BATTERY_LOW, Reading::magnitude(percent, at)));
    }
    readings
}
