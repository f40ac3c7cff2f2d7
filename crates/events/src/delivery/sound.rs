//! Alarm sound response.
//!
//! [`SoundResponse`] starts the alarm sound when an alarm is delivered and
//! schedules playback to stop once the response window is over.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use guard_core::alarm::{AlarmEvent, AlarmSink, SinkError};
use guard_core::config::GuardConfig;
use guard_core::scheduler::Scheduler;

/// Which sound to play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoundSource {
    /// The platform alarm tone (falling back to notification, then ringtone).
    Default,
    /// A user-selected sound, by URI.
    Custom(String),
}

impl SoundSource {
    pub fn from_config(config: &GuardConfig) -> Self {
        match &config.custom_alarm_sound {
            Some(uri) => SoundSource::Custom(uri.clone()),
            None => SoundSource::Default,
        }
    }
}

impl fmt::Display for SoundSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoundSource::Default => f.write_str("default alarm"),
            SoundSource::Custom(uri) => f.write_str(uri),
        }
    }
}

/// Identifies one playback started by an [`AlarmPlayer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackId(pub u64);

/// Plays alarm sounds. `start` must not block until playback ends.
pub trait AlarmPlayer: Send + Sync {
    fn start(&self, sound: &SoundSource) -> Result<PlaybackId, SinkError>;
    fn stop(&self, id: PlaybackId);
}

/// [`AlarmPlayer`] that logs playback and tracks what is currently "playing".
#[derive(Debug, Default)]
pub struct LogPlayer {
    next_id: AtomicU64,
    playing: Mutex<HashSet<PlaybackId>>,
}

impl LogPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of playbacks started and not yet stopped.
    pub fn playing(&self) -> usize {
        self.playing.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl AlarmPlayer for LogPlayer {
    fn start(&self, sound: &SoundSource) -> Result<PlaybackId, SinkError> {
        let id = PlaybackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.playing
            .lock()
            .map_err(|_| SinkError::Unavailable("player state poisoned".into()))?
            .insert(id);
        tracing::info!(playback = id.0, sound = %sound, "Alarm sound started");
        Ok(id)
    }

    fn stop(&self, id: PlaybackId) {
        if let Ok(mut playing) = self.playing.lock() {
            playing.remove(&id);
        }
        tracing::info!(playback = id.0, "Alarm sound stopped");
    }
}

// ---------------------------------------------------------------------------
// SoundResponse
// ---------------------------------------------------------------------------

/// Plays the alarm sound for a fixed duration on every delivered alarm.
pub struct SoundResponse {
    player: Arc<dyn AlarmPlayer>,
    scheduler: Arc<dyn Scheduler>,
    sound: SoundSource,
    duration: Duration,
}

impl SoundResponse {
    pub fn new(
        player: Arc<dyn AlarmPlayer>,
        scheduler: Arc<dyn Scheduler>,
        sound: SoundSource,
        duration: Duration,
    ) -> Self {
        Self {
            player,
            scheduler,
            sound,
            duration,
        }
    }
}

impl AlarmSink for SoundResponse {
    fn deliver(&self, event: &AlarmEvent) -> Result<(), SinkError> {
        let id = self.player.start(&self.sound)?;
        tracing::debug!(
            rule = %event.rule,
            playback = id.0,
            duration_ms = self.duration.as_millis() as u64,
            "Alarm sound scheduled to stop"
        );

        let player = Arc::clone(&self.player);
        // The stop job outlives this call; its handle is not needed.
        let _ = self
            .scheduler
            .schedule(self.duration, Box::new(move || player.stop(id)));
        Ok(())
    }
}
