//! Webhook delivery with exponential-backoff retry.
//!
//! [`WebhookDelivery`] sends a JSON-encoded alarm to an external URL via HTTP
//! POST. Failed attempts are retried up to three times with exponential
//! backoff (1 s, 2 s, 4 s).

use std::time::Duration;

use guard_core::alarm::AlarmEvent;
use guard_core::feature::SecurityFeature;

/// Retry delays in seconds (exponential backoff: 1s, 2s, 4s).
const RETRY_DELAYS_SECS: [u64; 3] = [1, 2, 4];

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for webhook delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The HTTP client could not be constructed.
    #[error("HTTP client setup failed: {0}")]
    Client(reqwest::Error),

    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code.
    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),
}

// ---------------------------------------------------------------------------
// WebhookDelivery
// ---------------------------------------------------------------------------

/// Delivers alarms to an external webhook endpoint.
pub struct WebhookDelivery {
    client: reqwest::Client,
}

impl WebhookDelivery {
    /// Create a new delivery service with a pre-configured HTTP client.
    pub fn new() -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(WebhookError::Client)?;
        Ok(Self { client })
    }

    /// The JSON body posted for an alarm.
    pub fn payload(feature: SecurityFeature, alarm: &AlarmEvent) -> serde_json::Value {
        serde_json::json!({
            "event_type": "alarm",
            "feature": feature,
            "id": alarm.id,
            "rule": alarm.rule,
            "message": alarm.message,
            "value": alarm.value,
            "timestamp": alarm.triggered_at,
        })
    }

    /// Deliver an alarm to a webhook URL with retry.
    ///
    /// Retries up to 3 times with exponential backoff before giving up.
    /// Returns `Ok(())` on the first successful attempt.
    pub async fn deliver(
        &self,
        url: &str,
        feature: SecurityFeature,
        alarm: &AlarmEvent,
    ) -> Result<(), WebhookError> {
        let payload = Self::payload(feature, alarm);

        let mut last_err: Option<WebhookError> = None;

        for (attempt, delay_secs) in RETRY_DELAYS_SECS.iter().enumerate() {
            match self.try_send(url, &payload).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        url,
                        error = %e,
                        "Webhook delivery attempt failed, retrying"
                    );
                    last_err = Some(e);
                    tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
                }
            }
        }

        // Final attempt after the last backoff.
        match self.try_send(url, &payload).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(url, error = %e, "Webhook delivery failed after all retries");
                Err(last_err.unwrap_or(e))
            }
        }
    }

    /// Execute a single POST request and check the response status.
    async fn try_send(&self, url: &str, payload: &serde_json::Value) -> Result<(), WebhookError> {
        let response = self.client.post(url).json(payload).send().await?;
        if !response.status().is_success() {
            return Err(WebhookError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use guard_core::reading::ReadingValue;
    use guard_core::rule::{Comparator, ThresholdRule};

    use super::*;

    #[test]
    fn new_builds_a_client() {
        assert!(WebhookDelivery::new().is_ok());
    }

    #[test]
    fn payload_carries_alarm_fields() {
        let rule = ThresholdRule::new("proximity.near", Comparator::LessThan, 5.0)
            .with_message("Object detected nearby!");
        let alarm = AlarmEvent::new(&rule, ReadingValue::Magnitude(1.5), Utc::now());

        let payload = WebhookDelivery::payload(SecurityFeature::ProximityDetection, &alarm);
        assert_eq!(payload["event_type"], "alarm");
        assert_eq!(payload["feature"], "proximity_detection");
        assert_eq!(payload["rule"], "proximity.near");
        assert_eq!(payload["message"], "Object detected nearby!");
        assert_eq!(payload["value"], 1.5);
    }

    #[test]
    fn webhook_error_display_http_status() {
        let err = WebhookError::HttpStatus(502);
        assert_eq!(err.to_string(), "Webhook returned HTTP 502");
    }

    #[test]
    fn webhook_error_display_request() {
        // Build a reqwest error from an invalid URL.
        let req_err = reqwest::Client::new().get("://bad").build().unwrap_err();
        let err = WebhookError::Request(req_err);
        assert!(err.to_string().contains("HTTP request failed"));
    }
}
