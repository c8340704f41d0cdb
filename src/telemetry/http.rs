//! JSON-over-HTTP telemetry uplink.
//!
//! Every event becomes one `POST` to the configured endpoint:
//!
//! ```json
//! { "event": "measurements", "device": "acoustic-node", "data": { "T_in": 21.5, ... } }
//! ```
//!
//! `data` is `null` for events without a payload.

use async_trait::async_trait;

use super::{TelemetryError, TelemetryEvent, TelemetryUplink};
use crate::config::TelemetryConfig;

pub struct HttpUplink {
    client: reqwest::Client,
    endpoint: String,
    device_id: String,
}

impl HttpUplink {
    /// Build an uplink posting to `endpoint`.
    ///
    /// The HTTP client carries the per-request timeout from
    /// `config.timeout_secs`; a default client is used if the builder fails.
    pub fn new(config: &TelemetryConfig, endpoint: &str, device_id: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            endpoint: endpoint.to_string(),
            device_id: device_id.to_string(),
        }
    }

    fn body(&self, event: &TelemetryEvent) -> serde_json::Value {
        serde_json::json!({
            "event":  event.name(),
            "device": self.device_id,
            "data":   event.payload(),
        })
    }
}

#[async_trait]
impl TelemetryUplink for HttpUplink {
    async fn send(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        self.client
            .post(&self.endpoint)
            .json(&self.body(event))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
