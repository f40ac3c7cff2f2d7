//! Security feature registry.
//!
//! [`SecurityGuard`] owns the monitors of every enabled feature and routes
//! incoming samples to them. Lifecycle changes are published on the
//! [`EventBus`] so observers see the same stream whether a feature is
//! toggled, fires an alarm, or fails to start.

use std::collections::BTreeMap;
use std::sync::Arc;

use guard_core::alarm::AlarmSink;
use guard_core::config::GuardConfig;
use guard_core::error::CoreError;
use guard_core::feature::SecurityFeature;
use guard_core::monitor::{AlarmGate, DebouncedMonitor, FeedOutcome};
use guard_core::rule::ThresholdRule;
use guard_core::scheduler::Scheduler;
use guard_core::types::Timestamp;
use guard_events::{
    AlarmPlayer, EventBus, FanoutSink, GuardEvent, NotificationSink, Notifier, SoundResponse,
    SoundSource,
};

use crate::sources::{AllSourcesAvailable, FeatureSource, Sample, SourceProbe};

/// Builds an extra sink for each monitor of a feature.
pub type SinkFactory = Arc<dyn Fn(SecurityFeature) -> Arc<dyn AlarmSink> + Send + Sync>;

/// Parse a comma-separated feature list. Empty input or `all` selects every
/// feature.
pub fn parse_feature_list(raw: &str) -> Result<Vec<SecurityFeature>, CoreError> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("all") {
        return Ok(SecurityFeature::ALL.to_vec());
    }

    let mut features = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let feature: SecurityFeature = name.parse()?;
        if !features.contains(&feature) {
            features.push(feature);
        }
    }
    Ok(features)
}

struct ActiveFeature {
    source: FeatureSource,
    monitors: Vec<DebouncedMonitor>,
}

/// Registry of enabled security features.
pub struct SecurityGuard {
    config: GuardConfig,
    bus: Arc<EventBus>,
    scheduler: Arc<dyn Scheduler>,
    probe: Arc<dyn SourceProbe>,
    notifier: Option<Arc<dyn Notifier>>,
    player: Option<Arc<dyn AlarmPlayer>>,
    sink_factories: Vec<SinkFactory>,
    active: BTreeMap<SecurityFeature, ActiveFeature>,
}

impl SecurityGuard {
    pub fn new(config: GuardConfig, scheduler: Arc<dyn Scheduler>, bus: Arc<EventBus>) -> Self {
        Self {
            config,
            bus,
            scheduler,
            probe: Arc::new(AllSourcesAvailable),
            notifier: None,
            player: None,
            sink_factories: Vec::new(),
            active: BTreeMap::new(),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn SourceProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_player(mut self, player: Arc<dyn AlarmPlayer>) -> Self {
        self.player = Some(player);
        self
    }

    /// Attach one more sink to every monitor built from now on.
    pub fn with_sink_factory(mut self, factory: SinkFactory) -> Self {
        self.sink_factories.push(factory);
        self
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Replace the configuration.
    ///
    /// Monitors already running keep the rules they were built with; a
    /// feature picks up the new values the next time it is enabled.
    pub fn configure(&mut self, config: GuardConfig) {
        tracing::info!(
            alarm_duration_ms = config.alarm_duration_ms,
            motion_sensitivity = config.motion_sensitivity,
            clap_sensitivity = config.clap_sensitivity,
            low_battery_threshold = config.low_battery_threshold,
            "Guard configuration updated"
        );
        self.config = config;
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start monitoring a feature. Enabling an already enabled feature does
    /// nothing.
    pub fn enable_feature(&mut self, feature: SecurityFeature) -> Result<(), CoreError> {
        if self.active.contains_key(&feature) {
            tracing::debug!(feature = %feature, "Feature already enabled");
            return Ok(());
        }

        if let Err(reason) = self.probe.probe(feature) {
            tracing::error!(feature = %feature, reason = %reason, "Reading source unavailable");
            self.bus.publish(GuardEvent::error(feature, reason.clone()));
            return Err(CoreError::SourceUnavailable { feature, reason });
        }

        let shared_gate = feature.shares_gate().then(AlarmGate::new);
        let monitors = feature
            .rules(&self.config)
            .into_iter()
            .map(|rule| {
                let sink = self.sink_for(feature, &rule);
                let monitor = DebouncedMonitor::new(rule, sink, Arc::clone(&self.scheduler));
                match &shared_gate {
                    Some(gate) => monitor.with_gate(gate.clone()),
                    None => monitor,
                }
            })
            .collect::<Vec<_>>();

        tracing::info!(feature = %feature, rules = monitors.len(), "Feature enabled");
        self.active.insert(
            feature,
            ActiveFeature {
                source: FeatureSource::new(feature, &self.config),
                monitors,
            },
        );
        self.bus.publish(GuardEvent::enabled(feature));
        Ok(())
    }

    /// Stop monitoring a feature. Returns whether it was enabled.
    pub fn disable_feature(&mut self, feature: SecurityFeature) -> bool {
        let Some(mut stopped) = self.active.remove(&feature) else {
            return false;
        };
        for monitor in &mut stopped.monitors {
            monitor.shutdown();
        }
        tracing::info!(feature = %feature, "Feature disabled");
        self.bus.publish(GuardEvent::disabled(feature));
        true
    }

    pub fn is_feature_enabled(&self, feature: SecurityFeature) -> bool {
        self.active.contains_key(&feature)
    }

    /// Enable several features, continuing past failures. Returns the
    /// features that could not be enabled.
    pub fn enable_features(
        &mut self,
        features: &[SecurityFeature],
    ) -> Vec<(SecurityFeature, CoreError)> {
        features
            .iter()
            .filter_map(|&feature| self.enable_feature(feature).err().map(|e| (feature, e)))
            .collect()
    }

    pub fn disable_features(&mut self, features: &[SecurityFeature]) {
        for &feature in features {
            self.disable_feature(feature);
        }
    }

    /// Disable every enabled feature.
    pub fn stop_all(&mut self) {
        let enabled = self.active_features();
        self.disable_features(&enabled);
    }

    /// Enabled features in stable order.
    pub fn active_features(&self) -> Vec<SecurityFeature> {
        self.active.keys().copied().collect()
    }

    // -----------------------------------------------------------------------
    // Readings
    // -----------------------------------------------------------------------

    /// Route one sample to the monitors of `feature`.
    ///
    /// Returns one outcome per reading the sample produced, which may be
    /// none. A delivered alarm is published as [`GuardEvent::Alarm`]; a failed
    /// delivery only as [`GuardEvent::Error`].
    pub fn feed(
        &mut self,
        feature: SecurityFeature,
        sample: &Sample,
        at: Timestamp,
    ) -> Result<Vec<FeedOutcome>, CoreError> {
        let active = self
            .active
            .get_mut(&feature)
            .ok_or(CoreError::FeatureNotEnabled(feature))?;

        let readings = active.source.readings(sample, at)?;
        let mut outcomes = Vec::with_capacity(readings.len());
        for (rule, reading) in readings {
            let Some(monitor) = active.monitors.iter_mut().find(|m| m.rule().name == rule) else {
                tracing::warn!(feature = %feature, rule, "No monitor for rule");
                continue;
            };
            let outcome = monitor.feed(&reading);
            match &outcome {
                FeedOutcome::Fired(alarm) => self.bus.publish(GuardEvent::Alarm {
                    feature,
                    alarm: alarm.clone(),
                }),
                FeedOutcome::DeliveryFailed(alarm, err) => self.bus.publish(GuardEvent::error(
                    feature,
                    format!("{} delivery failed: {err}", alarm.rule),
                )),
                FeedOutcome::Idle | FeedOutcome::Suppressed(_) => {}
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Stop every feature and release the registry.
    pub fn shutdown(mut self) {
        self.stop_all();
        tracing::info!("Security guard shut down");
    }

    fn sink_for(&self, feature: SecurityFeature, rule: &ThresholdRule) -> Arc<dyn AlarmSink> {
        let mut fanout = FanoutSink::new();

        if let Some(notifier) = &self.notifier {
            fanout = fanout.with(Arc::new(NotificationSink::new(
                Arc::clone(notifier),
                &self.config,
            )));
        }

        if let Some(player) = &self.player {
            if !rule.response_duration.is_zero() {
                fanout = fanout.with(Arc::new(SoundResponse::new(
                    Arc::clone(player),
                    Arc::clone(&self.scheduler),
                    SoundSource::from_config(&self.config),
                    rule.response_duration,
                )));
            }
        }

        for factory in &self.sink_factories {
            fanout = fanout.with(factory(feature));
        }
        Arc::new(fanout)
    }
}

impl std::fmt::Debug for SecurityGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityGuard")
            .field("config", &self.config)
            .field("active", &self.active_features())
            .finish_non_exhaustive()
    }
}
