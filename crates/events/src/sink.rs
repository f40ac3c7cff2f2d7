//! Alarm sinks that fan alarms out and forward them to outbound delivery.

use std::sync::Arc;

use guard_core::alarm::{AlarmEvent, AlarmSink, SinkError};
use guard_core::feature::SecurityFeature;
use tokio::runtime::Handle;

use crate::delivery::webhook::WebhookDelivery;

// ---------------------------------------------------------------------------
// FanoutSink
// ---------------------------------------------------------------------------

/// Delivers each alarm to every inner sink in order.
///
/// All sinks are attempted even if one fails; the first error is returned.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn AlarmSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn AlarmSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl AlarmSink for FanoutSink {
    fn deliver(&self, event: &AlarmEvent) -> Result<(), SinkError> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(event) {
                tracing::warn!(rule = %event.rule, error = %e, "Alarm sink failed");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// WebhookSink
// ---------------------------------------------------------------------------

/// Forwards alarms to a webhook on a spawned task.
///
/// Delivery outcome is only logged; the monitor never waits on the network.
pub struct WebhookSink {
    delivery: Arc<WebhookDelivery>,
    url: String,
    feature: SecurityFeature,
    handle: Handle,
}

impl WebhookSink {
    pub fn new(
        delivery: Arc<WebhookDelivery>,
        url: impl Into<String>,
        feature: SecurityFeature,
        handle: Handle,
    ) -> Self {
        Self {
            delivery,
            url: url.into(),
            feature,
            handle,
        }
    }
}

impl AlarmSink for WebhookSink {
    fn deliver(&self, event: &AlarmEvent) -> Result<(), SinkError> {
        let delivery = Arc::clone(&self.delivery);
        let url = self.url.clone();
        let feature = self.feature;
        let event = event.clone();

        self.handle.spawn(async move {
            if let Err(e) = delivery.deliver(&url, feature, &event).await {
                tracing::error!(
                    url = %url,
                    event_id = %event.id,
                    error = %e,
                    "Alarm webhook not delivered"
                );
            }
        });
        Ok(())
    }
}
