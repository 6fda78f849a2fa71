//! Incoming events as received from the queue or the direct ingress.

use serde::Serialize;
use serde_json::Value;

use super::errors::EventError;

/// Discriminator used when an event carries no usable `type` field.
pub const UNKNOWN_EVENT_TYPE: &str = "UNKNOWN_EVENT";

/// An opaque event body.
///
/// Any JSON object or array is accepted; its contents are defined by the
/// producer. By convention an object carries a string `type` field that
/// classifies the event. Scalars and `null` are rejected.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct IncomingEvent(Value);

impl IncomingEvent {
    /// Accepts any JSON object or array.
    pub fn from_value(value: Value) -> Result<Self, EventError> {
        match value {
            Value::Object(_) | Value::Array(_) => Ok(Self(value)),
            other => Err(EventError::NotStructured {
                found: json_kind(&other),
            }),
        }
    }

    /// Parses raw message bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, EventError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// The event's `type`, or [`UNKNOWN_EVENT_TYPE`] when it is missing,
    /// empty or not a string. Arrays never carry a type.
    pub fn event_type(&self) -> &str {
        match self.0.get("type").and_then(Value::as_str) {
            Some(kind) if !kind.is_empty() => kind,
            _ => UNKNOWN_EVENT_TYPE,
        }
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
