use crate::connection::Class;
use crate::error::Result;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use events::{DiscoveryUpdate, JobEvent, ScanUpdate};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

pub const SCAN_UPDATE: &str = "scan_update";
pub const DISCOVERY_UPDATE: &str = "discovery_update";
/// Envelope type used for operator broadcasts that don't name their own.
pub const SYSTEM_MESSAGE: &str = "system_message";

/// Trait for getting the wire `type` name of an event
pub trait EventType {
    fn event_type(&self) -> &str;
}

/// Named broadcast channel with its own bounded publish buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Scan,
    Discovery,
    /// Operator and maintenance broadcasts; delivered to every subscriber once.
    System,
}

impl Topic {
    /// Subscriber class the topic fans out to, `None` meaning every connection.
    pub fn class(self) -> Option<Class> {
        match self {
            Topic::Scan => Some(Class::Scan),
            Topic::Discovery => Some(Class::Discovery),
            Topic::System => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Scan => "scan",
            Topic::Discovery => "discovery",
            Topic::System => "system",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of known payloads plus one open kind for ad hoc system messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    ScanUpdate(ScanUpdate),
    DiscoveryUpdate(DiscoveryUpdate),
    System(Map<String, Value>),
}

/// Wire message: `{"type", "timestamp", "data", "request_id"?}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    timestamp: DateTime<Utc>,
    #[serde(rename = "data")]
    payload: Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
}

impl Envelope {
    pub fn scan_update(mut update: ScanUpdate) -> Self {
        update.progress = clamp_progress(update.progress);
        Self::new(SCAN_UPDATE, Payload::ScanUpdate(update))
    }

    pub fn discovery_update(mut update: DiscoveryUpdate) -> Self {
        update.progress = clamp_progress(update.progress);
        Self::new(DISCOVERY_UPDATE, Payload::DiscoveryUpdate(update))
    }

    /// A system message whose data is `{"message": <message>}`.
    pub fn system_message(kind: impl Into<String>, message: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert("message".to_string(), Value::String(message.into()));
        Self::system(kind, data)
    }

    /// A system message with a free-form object payload.
    pub fn system(kind: impl Into<String>, data: Map<String, Value>) -> Self {
        Self::new(kind, Payload::System(data))
    }

    fn new(kind: impl Into<String>, payload: Payload) -> Self {
        Self {
            kind: kind.into(),
            timestamp: Utc::now(),
            payload,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn topic(&self) -> Topic {
        match self.payload {
            Payload::ScanUpdate(_) => Topic::Scan,
            Payload::DiscoveryUpdate(_) => Topic::Discovery,
            Payload::System(_) => Topic::System,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Serializes the envelope once; the returned buffer is shared by every recipient.
    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}

impl EventType for Envelope {
    fn event_type(&self) -> &str {
        &self.kind
    }
}

impl From<&JobEvent> for Envelope {
    fn from(event: &JobEvent) -> Self {
        let envelope = match event {
            JobEvent::ScanProgress { update, .. } => Envelope::scan_update(update.clone()),
            JobEvent::DiscoveryProgress { update, .. } => {
                Envelope::discovery_update(update.clone())
            }
            JobEvent::SystemNotice { kind, message, .. } => {
                Envelope::system_message(kind.as_str(), message.as_str())
            }
        };
        envelope.with_request_id(event.request_id().map(str::to_owned))
    }
}

fn clamp_progress(progress: f64) -> f64 {
    if progress.is_finite() {
        progress.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn decode(bytes: &Bytes) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn scan_update_envelope_has_expected_wire_shape() {
        let timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let envelope = Envelope::scan_update(ScanUpdate::new(123, "running", 50.0))
            .with_timestamp(timestamp);

        let value = decode(&envelope.encode().unwrap());

        assert_eq!(
            value,
            json!({
                "type": "scan_update",
                "timestamp": "2024-05-01T12:00:00Z",
                "data": {"scan_id": 123, "status": "running", "progress": 50.0}
            })
        );
        assert_eq!(envelope.topic(), Topic::Scan);
    }

    #[test]
    fn request_id_is_included_only_when_set() {
        let envelope = Envelope::discovery_update(DiscoveryUpdate::new(9, "running", 10.0))
            .with_request_id(Some("req-42".to_string()));
        let value = decode(&envelope.encode().unwrap());
        assert_eq!(value["request_id"], "req-42");
        assert_eq!(value["type"], "discovery_update");
        assert_eq!(value["data"]["job_id"], 9);

        let without = Envelope::discovery_update(DiscoveryUpdate::new(9, "running", 10.0));
        assert!(decode(&without.encode().unwrap()).get("request_id").is_none());
    }

    #[test]
    fn system_message_carries_free_form_type() {
        let envelope = Envelope::system_message("maintenance", "Scanner restarting");
        let value = decode(&envelope.encode().unwrap());
        assert_eq!(value["type"], "maintenance");
        assert_eq!(value["data"], json!({"message": "Scanner restarting"}));
        assert_eq!(envelope.topic(), Topic::System);
        assert_eq!(envelope.event_type(), "maintenance");
    }

    #[test]
    fn progress_is_clamped_into_percent_range() {
        let over = Envelope::scan_update(ScanUpdate::new(1, "running", 140.0));
        let under = Envelope::discovery_update(DiscoveryUpdate::new(1, "running", -3.0));
        let nan = Envelope::scan_update(ScanUpdate::new(1, "running", f64::NAN));

        assert!(matches!(&over.payload, Payload::ScanUpdate(u) if u.progress == 100.0));
        assert!(matches!(&under.payload, Payload::DiscoveryUpdate(u) if u.progress == 0.0));
        assert!(matches!(&nan.payload, Payload::ScanUpdate(u) if u.progress == 0.0));
    }

    #[test]
    fn job_events_map_to_topics() {
        let scan = JobEvent::ScanProgress {
            update: ScanUpdate::new(1, "queued", 0.0),
            request_id: Some("abc".to_string()),
        };
        let notice = JobEvent::SystemNotice {
            kind: SYSTEM_MESSAGE.to_string(),
            message: "hello".to_string(),
            request_id: None,
        };

        let scan_envelope = Envelope::from(&scan);
        assert_eq!(scan_envelope.topic(), Topic::Scan);
        assert_eq!(scan_envelope.request_id(), Some("abc"));
        assert_eq!(Envelope::from(&notice).topic(), Topic::System);
    }
}
