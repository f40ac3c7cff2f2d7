//! Pure domain logic for the security guard monitors.
//!
//! Nothing in this crate touches an OS API or an async runtime. Reading
//! sources, notification delivery and sound playback live behind the traits
//! defined here and are implemented by `guard-events` and `guard-agent`.

pub mod alarm;
pub mod config;
pub mod error;
pub mod feature;
pub mod monitor;
pub mod reading;
pub mod rule;
pub mod scheduler;
pub mod signal;
pub mod types;
