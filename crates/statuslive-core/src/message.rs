//! Wire messages.
//!
//! Both directions use the same JSON text envelope:
//!
//! ```text
//! { "type": "status_update", "data": { ... } }
//! ```
//!
//! `type` is matched case-sensitively. `data` is opaque to the live-update
//! layer and defaults to `null` when absent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MessageError;

/// Message pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Message kind (wire field `type`)
    #[serde(rename = "type")]
    pub kind: String,
    /// Opaque payload (wire field `data`)
    #[serde(rename = "data", default)]
    pub payload: Value,
}

impl InboundMessage {
    /// Create a message from its parts.
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self { kind: kind.into(), payload }
    }

    /// Parse a text frame.
    ///
    /// # Errors
    ///
    /// - `MessageError::Malformed` if the frame is not JSON or lacks a string
    ///   `type` field
    pub fn parse(frame: &str) -> Result<Self, MessageError> {
        Ok(serde_json::from_str(frame)?)
    }
}

/// Message sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Message kind (wire field `type`)
    #[serde(rename = "type")]
    pub kind: String,
    /// Payload (wire field `data`)
    pub data: Value,
}

impl OutboundMessage {
    /// Create a message with an arbitrary serializable payload.
    ///
    /// # Errors
    ///
    /// - `MessageError::Encode` if `data` cannot be represented as JSON
    pub fn new(kind: impl Into<String>, data: impl Serialize) -> Result<Self, MessageError> {
        let kind = kind.into();
        match serde_json::to_value(data) {
            Ok(data) => Ok(Self { kind, data }),
            Err(e) => Err(MessageError::Encode { kind, reason: e.to_string() }),
        }
    }

    /// Serialize to a text frame.
    ///
    /// # Errors
    ///
    /// - `MessageError::Encode` if serialization fails
    pub fn to_text(&self) -> Result<String, MessageError> {
        serde_json::to_string(self)
            .map_err(|e| MessageError::Encode { kind: self.kind.clone(), reason: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    #[test]
    fn parses_type_and_data() {
        let msg =
            InboundMessage::parse(r#"{"type":"status_update","data":{"service_id":"abc"}}"#)
                .unwrap();

        assert_eq!(msg.kind, "status_update");
        assert_eq!(msg.payload, json!({ "service_id": "abc" }));
    }

    #[test]
    fn missing_data_defaults_to_null() {
        let msg = InboundMessage::parse(r#"{"type":"service_deleted"}"#).unwrap();
        assert_eq!(msg.payload, Value::Null);
    }

    #[test]
    fn rejects_non_json() {
        let result = InboundMessage::parse("not json");
        assert!(matches!(result, Err(MessageError::Malformed { .. })));
    }

    #[test]
    fn rejects_missing_or_non_string_type() {
        assert!(InboundMessage::parse(r#"{"data":1}"#).is_err());
        assert!(InboundMessage::parse(r#"{"type":7,"data":1}"#).is_err());
        assert!(InboundMessage::parse("[1,2,3]").is_err());
    }

    #[test]
    fn outbound_uses_wire_field_names() {
        let msg = OutboundMessage::new("subscribe", json!({ "slug": "acme" })).unwrap();
        let text = msg.to_text().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value, json!({ "type": "subscribe", "data": { "slug": "acme" } }));
    }

    #[test]
    fn outbound_rejects_unrepresentable_payload() {
        let mut data = HashMap::new();
        data.insert((1, 2), "tuple keys are not JSON object keys");

        let result = OutboundMessage::new("bad", data);
        assert!(matches!(result, Err(MessageError::Encode { ref kind, .. }) if kind == "bad"));
    }
}
