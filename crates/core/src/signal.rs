//! Signal primitives that turn raw sensor samples into monitor readings.

use crate::types::Timestamp;

/// Minimum spacing between two accelerometer samples the tracker accepts.
const MOTION_SAMPLE_INTERVAL_MS: i64 = 100;

/// Scale applied to the per-millisecond acceleration delta.
const MOTION_SPEED_SCALE: f64 = 10_000.0;

/// Root-mean-square energy of a 16-bit PCM buffer. `0.0` for an empty buffer.
pub fn rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|&s| {
            let s = f64::from(s);
            s * s
        })
        .sum();
    (sum / samples.len() as f64).sqrt()
}

/// Battery charge percentage from a raw level and scale.
///
/// Returns `None` when the platform reports an unknown level (negative) or
/// an unusable scale.
pub fn battery_percent(level: i32, scale: i32) -> Option<f64> {
    if level < 0 || scale <= 0 {
        return None;
    }
    Some(f64::from(level) * 100.0 / f64::from(scale))
}

/// Converts accelerometer vectors into a shake speed.
///
/// Speed is `|(x + y + z) - (last_x + last_y + last_z)| / dt_ms * 10000`.
/// Samples closer than 100 ms to the last accepted one are dropped.
#[derive(Debug, Default, Clone)]
pub struct MotionTracker {
    last: Option<(Timestamp, f64)>,
}

impl MotionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a sample and return its shake speed.
    ///
    /// The first sample only establishes a baseline and yields `None`, as do
    /// samples inside the 100 ms sampling interval.
    pub fn sample(&mut self, x: f64, y: f64, z: f64, at: Timestamp) -> Option<f64> {
        let sum = x + y + z;
        let Some((last_at, last_sum)) = self.last else {
            self.last = Some((at, sum));
            return None;
        };

        let dt_ms = (at - last_at).num_milliseconds();
        if dt_ms <= MOTION_SAMPLE_INTERVAL_MS {
            return None;
        }

        self.last = Some((at, sum));
        Some((sum - last_sum).abs() / dt_ms as f64 * MOTION_SPEED_SCALE)
    }
}
