//! The seven security features and the rules each one is built from.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::GuardConfig;
use crate::error::CoreError;
use crate::rule::{Comparator, ThresholdRule};

pub const RULE_CHARGER_DISCONNECTED: &str = "charger.disconnected";
pub const RULE_BATTERY_FULL: &str = "battery.full";
pub const RULE_BATTERY_LOW: &str = "battery.low";
pub const RULE_WIFI_LOST: &str = "wifi.lost";
pub const RULE_WIFI_CONNECTED: &str = "wifi.connected";
pub const RULE_CLAP_DETECTED: &str = "clap.detected";
pub const RULE_MOTION_DETECTED: &str = "motion.detected";
pub const RULE_PROXIMITY_NEAR: &str = "proximity.near";
pub const RULE_HANDSFREE_DISCONNECTED: &str = "handsfree.disconnected";

/// Cooldown shared by the charger, Wi-Fi, clap and motion alarms.
const ALARM_COOLDOWN: Duration = Duration::from_secs(10);

/// Proximity re-arms faster than the other sensors.
const PROXIMITY_COOLDOWN: Duration = Duration::from_secs(3);

/// Response length of the charger and Wi-Fi alarms.
const STATE_ALARM_RESPONSE: Duration = Duration::from_secs(5);

/// Response length of the proximity and headset alarms.
const SHORT_ALARM_RESPONSE: Duration = Duration::from_secs(3);

/// Battery level treated as fully charged.
const BATTERY_FULL_PERCENT: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityFeature {
    /// Charger unplugged.
    ChargerDetection,
    /// Battery full while charging, or low.
    BatteryMonitor,
    /// Wi-Fi lost or connected.
    WifiMonitor,
    /// Clap detected on the microphone.
    ClapDetection,
    /// Device moved.
    MotionDetection,
    /// Object close to the proximity sensor.
    ProximityDetection,
    /// Headphones unplugged.
    HandsfreeDetection,
}

impl SecurityFeature {
    pub const ALL: [SecurityFeature; 7] = [
        SecurityFeature::ChargerDetection,
        SecurityFeature::BatteryMonitor,
        SecurityFeature::WifiMonitor,
        SecurityFeature::ClapDetection,
        SecurityFeature::MotionDetection,
        SecurityFeature::ProximityDetection,
        SecurityFeature::HandsfreeDetection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityFeature::ChargerDetection => "charger_detection",
            SecurityFeature::BatteryMonitor => "battery_monitor",
            SecurityFeature::WifiMonitor => "wifi_monitor",
            SecurityFeature::ClapDetection => "clap_detection",
            SecurityFeature::MotionDetection => "motion_detection",
            SecurityFeature::ProximityDetection => "proximity_detection",
            SecurityFeature::HandsfreeDetection => "handsfree_detection",
        }
    }

    /// Whether the rules of this feature share one active window and cooldown.
    ///
    /// Wi-Fi lost and connected describe one signal: a reconnect shortly
    /// after a loss is part of the same alarm.
    pub fn shares_gate(&self) -> bool {
        matches!(self, SecurityFeature::WifiMonitor)
    }

    /// Build the threshold rules for this feature from the current settings.
    pub fn rules(&self, config: &GuardConfig) -> Vec<ThresholdRule> {
        match self {
            SecurityFeature::ChargerDetection => vec![ThresholdRule::edge(
                RULE_CHARGER_DISCONNECTED,
                Comparator::EdgeFalling,
            )
            .with_cooldown(ALARM_COOLDOWN)
            .with_response_duration(STATE_ALARM_RESPONSE)
            .with_message("Charger disconnected!")],
            SecurityFeature::BatteryMonitor => vec![
                ThresholdRule::new(RULE_BATTERY_FULL, Comparator::AtLeast, BATTERY_FULL_PERCENT)
                    .with_message("Battery has been fully charged!"),
                ThresholdRule::new(
                    RULE_BATTERY_LOW,
                    Comparator::AtMost,
                    f64::from(config.low_battery_threshold),
                )
                .with_message("Battery is low! Current level: {value}%"),
            ],
            SecurityFeature::WifiMonitor => vec![
                ThresholdRule::edge(RULE_WIFI_LOST, Comparator::EdgeFalling)
                    .with_cooldown(ALARM_COOLDOWN)
                    .with_response_duration(STATE_ALARM_RESPONSE)
                    .with_message("WiFi connection lost!"),
                ThresholdRule::edge(RULE_WIFI_CONNECTED, Comparator::EdgeRising)
                    .with_cooldown(ALARM_COOLDOWN)
                    .with_response_duration(STATE_ALARM_RESPONSE)
                    .with_message("WiFi connected!"),
            ],
            SecurityFeature::ClapDetection => vec![ThresholdRule::new(
                RULE_CLAP_DETECTED,
                Comparator::GreaterThan,
                f64::from(config.clap_sensitivity),
            )
            .with_cooldown(ALARM_COOLDOWN)
            .with_response_duration(config.alarm_duration())
            .with_message("Clap detected! Phone found!")],
            SecurityFeature::MotionDetection => vec![ThresholdRule::new(
                RULE_MOTION_DETECTED,
                Comparator::GreaterThan,
                f64::from(config.motion_sensitivity),
            )
            .with_cooldown(ALARM_COOLDOWN)
            .with_response_duration(config.alarm_duration())
            .with_message("Motion detected!")],
            SecurityFeature::ProximityDetection => vec![ThresholdRule::new(
                RULE_PROXIMITY_NEAR,
                Comparator::LessThan,
                config.proximity_max_range,
            )
            .with_cooldown(PROXIMITY_COOLDOWN)
            .with_response_duration(SHORT_ALARM_RESPONSE)
            .with_message("Object detected nearby!")],
            SecurityFeature::HandsfreeDetection => vec![ThresholdRule::edge(
                RULE_HANDSFREE_DISCONNECTED,
                Comparator::EdgeFalling,
            )
            .with_response_duration(SHORT_ALARM_RESPONSE)
            .with_message("Headphones disconnected!")],
        }
    }
}

impl fmt::Display for SecurityFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityFeature {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        SecurityFeature::ALL
            .into_iter()
            .find(|f| f.as_str() == wanted)
            .ok_or_else(|| CoreError::UnknownFeature(s.to_string()))
    }
}

/// Notification title for an alarm raised by `rule`.
pub fn notification_title(rule: &str) -> Option<&'static str> {
    match rule {
        RULE_CHARGER_DISCONNECTED => Some("Charger Disconnected"),
        RULE_BATTERY_FULL => Some("Battery Full"),
        RULE_BATTERY_LOW => Some("Battery Low"),
        RULE_WIFI_LOST => Some("WiFi Disconnected"),
        RULE_WIFI_CONNECTED => Some("WiFi Connected"),
        RULE_CLAP_DETECTED => Some("Clap Detected"),
        RULE_MOTION_DETECTED => Some("Motion Detected"),
        RULE_PROXIMITY_NEAR => Some("Proximity Alert"),
        RULE_HANDSFREE_DISCONNECTED => Some("Headphones Disconnected"),
        _ => None,
    }
}
