//! Guard event bus and alarm delivery infrastructure.
//!
//! This crate provides the runtime pieces around the pure monitors in
//! `guard-core`:
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`GuardEvent`]: the event envelope (alarms and feature lifecycle).
//! - [`TokioScheduler`]: delayed jobs on the tokio runtime.
//! - [`sink`]: alarm sinks that fan out or forward to webhooks.
//! - [`delivery`]: notification, sound and webhook outputs.
//! - [`EventLogger`]: background task that logs every bus event.

pub mod bus;
pub mod delivery;
pub mod logger;
pub mod scheduler;
pub mod sink;

pub use bus::{EventBus, GuardEvent};
pub use delivery::notification::{LogNotifier, Notification, NotificationSink, Notifier};
pub use delivery::sound::{AlarmPlayer, LogPlayer, PlaybackId, SoundResponse, SoundSource};
pub use delivery::webhook::WebhookDelivery;
pub use logger::EventLogger;
pub use scheduler::TokioScheduler;
pub use sink::{FanoutSink, WebhookSink};
