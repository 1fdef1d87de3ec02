//! Domain events and the HTTP event sink.
//!
//! Sessions derive one event per meaningful inbound frame (login,
//! heartbeat telemetry, location). The sink forwards each event to the
//! external collector as a JSON record with a best-effort POST: the
//! request runs in its own task so a slow or failing collector can never
//! stall frame processing, and failures are logged but never retried.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use tracklock_core::{Error, Imei, Result};

use crate::config::GatewayConfig;

/// Event derived from device traffic.
///
/// The device identity is absent when a device sends data frames before
/// completing its login; such traffic is still acknowledged and
/// forwarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DeviceEvent {
    /// A device authenticated and was registered under its identity.
    LoggedIn { device_id: Option<Imei> },

    /// Heartbeat telemetry; the voltage is the raw wire reading.
    Telemetry {
        device_id: Option<Imei>,
        battery_voltage: u16,
    },

    /// Location report. Coordinates are the raw fixed-point words and
    /// are present only when the inbound frame carried a GPS block.
    Location {
        device_id: Option<Imei>,
        #[serde(skip_serializing_if = "Option::is_none")]
        lat: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        lng: Option<u32>,
    },
}

impl DeviceEvent {
    /// Identity the event belongs to, when known.
    pub fn device_id(&self) -> Option<&Imei> {
        match self {
            DeviceEvent::LoggedIn { device_id }
            | DeviceEvent::Telemetry { device_id, .. }
            | DeviceEvent::Location { device_id, .. } => device_id.as_ref(),
        }
    }
}

/// Fire-and-forget HTTP forwarder for device events.
#[derive(Debug, Clone)]
pub struct EventSink {
    client: reqwest::Client,
    endpoint: String,
    auth_header: Option<String>,
    labels: Vec<(String, String)>,
}

impl EventSink {
    /// Build a sink from the gateway configuration.
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("event sink HTTP client: {e}")))?;

        Ok(EventSink {
            client,
            endpoint: config.endpoint.clone(),
            auth_header: config.endpoint_auth_header.clone(),
            labels: config.labels.clone(),
        })
    }

    /// Forward one event to the collector.
    ///
    /// The POST is spawned on its own task; delivery failures are logged
    /// and otherwise ignored.
    pub fn publish(&self, event: DeviceEvent) {
        let record = self.render(&event);
        debug!(device_id = ?event.device_id(), record = %record, "forwarding event");

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .json(&record);
        if let Some(auth) = &self.auth_header {
            request = request.header(AUTHORIZATION, auth.clone());
        }

        let endpoint = self.endpoint.clone();
        tokio::spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(endpoint = %endpoint, status = %response.status(), "event delivered");
                }
                Ok(response) => {
                    warn!(endpoint = %endpoint, status = %response.status(), "collector rejected event");
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "event delivery failed");
                }
            }
        });
    }

    /// Merge the static label set under the event's own fields.
    fn render(&self, event: &DeviceEvent) -> Value {
        let mut record = Map::new();
        for (key, value) in &self.labels {
            record.insert(key.clone(), Value::String(value.clone()));
        }
        if let Value::Object(fields) = serde_json::json!(event) {
            record.extend(fields);
        }
        Value::Object(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink_with_labels(labels: Vec<(String, String)>) -> EventSink {
        let config = GatewayConfig::from_lookup(|key| match key {
            "ENDPOINT" => Some("http://127.0.0.1:1/events".to_string()),
            _ => None,
        })
        .unwrap();
        EventSink::new(&GatewayConfig { labels, ..config }).unwrap()
    }

    #[test]
    fn test_logged_in_record() {
        let sink = sink_with_labels(Vec::new());
        let record = sink.render(&DeviceEvent::LoggedIn {
            device_id: Some(Imei::new("12345678").unwrap()),
        });
        assert_eq!(record, serde_json::json!({"device_id": "12345678"}));
    }

    #[test]
    fn test_telemetry_record() {
        let sink = sink_with_labels(Vec::new());
        let record = sink.render(&DeviceEvent::Telemetry {
            device_id: Some(Imei::new("12345678").unwrap()),
            battery_voltage: 402,
        });
        assert_eq!(
            record,
            serde_json::json!({"device_id": "12345678", "battery_voltage": 402})
        );
    }

    #[test]
    fn test_location_record_omits_absent_coordinates() {
        let sink = sink_with_labels(Vec::new());
        let record = sink.render(&DeviceEvent::Location {
            device_id: Some(Imei::new("12345678").unwrap()),
            lat: None,
            lng: None,
        });
        assert_eq!(record, serde_json::json!({"device_id": "12345678"}));

        let record = sink.render(&DeviceEvent::Location {
            device_id: Some(Imei::new("12345678").unwrap()),
            lat: Some(0x026B_3F3E),
            lng: Some(0x0C22_AD65),
        });
        assert_eq!(
            record,
            serde_json::json!({
                "device_id": "12345678",
                "lat": 0x026B_3F3Eu32,
                "lng": 0x0C22_AD65u32
            })
        );
    }

    #[test]
    fn test_pre_login_event_has_null_identity() {
        let sink = sink_with_labels(Vec::new());
        let record = sink.render(&DeviceEvent::Telemetry {
            device_id: None,
            battery_voltage: 390,
        });
        assert_eq!(
            record,
            serde_json::json!({"device_id": null, "battery_voltage": 390})
        );
    }

    #[test]
    fn test_labels_are_folded_in() {
        let sink = sink_with_labels(vec![("site".to_string(), "garage".to_string())]);
        let record = sink.render(&DeviceEvent::LoggedIn {
            device_id: Some(Imei::new("42").unwrap()),
        });
        assert_eq!(
            record,
            serde_json::json!({"site": "garage", "device_id": "42"})
        );
    }
}
