//! Alarm outputs: notifications, alarm sound and webhooks.
//!
//! The OS-facing parts (posting a notification, driving a media player) sit
//! behind the [`Notifier`](notification::Notifier) and
//! [`AlarmPlayer`](sound::AlarmPlayer) traits. The log-backed implementations
//! here are what the agent uses when no platform binding is present.

pub mod notification;
pub mod sound;
pub mod webhook;
