//! Broadcast envelope sent to every subscriber.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::event::IncomingEvent;

/// A serialized envelope, shared read-only across all subscriber sends.
pub type Frame = Arc<str>;

/// Normalized `{ type, payload }` shape pushed to subscribers.
///
/// `payload` is the original event, unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: Value,
}

impl BroadcastEnvelope {
    /// Wraps an incoming event.
    pub fn wrap(event: IncomingEvent) -> Self {
        Self {
            event_type: event.event_type().to_string(),
            payload: event.into_value(),
        }
    }

    /// Serializes the envelope once for fan-out.
    pub fn to_frame(&self) -> Result<Frame, serde_json::Error> {
        serde_json::to_string(self).map(Frame::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::relay::UNKNOWN_EVENT_TYPE;
    use serde_json::json;

    #[test]
    fn wrap_nests_original_event_as_payload() {
        let event =
            IncomingEvent::from_value(json!({"type": "NOTE_CREATED", "payload": {"id": "n1"}}))
                .unwrap();

        let envelope = BroadcastEnvelope::wrap(event);

        assert_eq!(envelope.event_type, "NOTE_CREATED");
        assert_eq!(
            envelope.payload,
            json!({"type": "NOTE_CREATED", "payload": {"id": "n1"}})
        );
    }

    #[test]
    fn frame_has_exact_wire_shape() {
        let event =
            IncomingEvent::from_value(json!({"type": "NOTE_CREATED", "payload": {"id": "n1"}}))
                .unwrap();

        let frame = BroadcastEnvelope::wrap(event).to_frame().unwrap();
        let on_wire: Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(
            on_wire,
            json!({
                "type": "NOTE_CREATED",
                "payload": {"payload": {"id": "n1"}, "type": "NOTE_CREATED"}
            })
        );
    }

    #[test]
    fn untyped_event_gets_unknown_type() {
        let event = IncomingEvent::from_value(json!({"id": 3})).unwrap();
        let envelope = BroadcastEnvelope::wrap(event);
        assert_eq!(envelope.event_type, UNKNOWN_EVENT_TYPE);
    }
}
