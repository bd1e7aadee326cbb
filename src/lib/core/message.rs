use std::fmt;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::core::{Command, Frame};

pub const CORRELATION_HEADER: &str = "correlation-id";

/// Local handle for one topic subscription. Never reused within a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local-{}", self.0)
    }
}

/// Identifier attached to every outbound command. Brokers that echo it on the
/// result event let a consumer tell concurrent commands apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An inbound topic message as handed to subscriber callbacks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub destination: String,
    pub message_id: Option<String>,
    pub correlation_id: Option<String>,
    pub payload: Value,
    pub received_at: i64,
}

impl Event {
    pub(crate) fn from_frame(frame: &Frame, destination: &str) -> Result<Self, serde_json::Error> {
        debug_assert_eq!(frame.command, Command::Message);
        let payload = serde_json::from_slice(&frame.body)?;
        Ok(Self {
            destination: destination.to_string(),
            message_id: frame.get("message-id").map(str::to_string),
            correlation_id: frame.get(CORRELATION_HEADER).map(str::to_string),
            payload,
            received_at: Utc::now().timestamp_millis(),
        })
    }

    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }

    /// True when the broker echoed `id` on this event.
    pub fn answers(&self, id: &CorrelationId) -> bool {
        self.correlation_id
            .as_deref()
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .is_some_and(|uuid| uuid == id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_reads_headers_and_json_body() {
        let id = CorrelationId::new();
        let frame = Frame::new(Command::Message)
            .header("destination", "/topic/pledge/success")
            .header("message-id", "m-1")
            .header(CORRELATION_HEADER, id.to_string())
            .body(br#"{"pledgeId":9}"#.to_vec());
        let event = Event::from_frame(&frame, "/topic/pledge/success").unwrap();
        assert_eq!(event.message_id.as_deref(), Some("m-1"));
        assert_eq!(event.payload, json!({"pledgeId": 9}));
        assert!(event.answers(&id));
        assert!(!event.answers(&CorrelationId::new()));
    }

    #[test]
    fn non_json_body_is_rejected() {
        let frame = Frame::new(Command::Message).body(&b"not json"[..]);
        assert!(Event::from_frame(&frame, "/topic/x").is_err());
    }
}
