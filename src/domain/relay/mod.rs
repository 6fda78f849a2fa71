//! Relay domain: what flows from the queue to subscribers.
//!
//! - [`IncomingEvent`] - opaque JSON object or array received from a producer
//! - [`BroadcastEnvelope`] - `{ type, payload }` shape pushed to subscribers
//! - [`Frame`] - an envelope serialized once and shared by every send

mod envelope;
mod errors;
mod event;

pub use envelope::{BroadcastEnvelope, Frame};
pub use errors::EventError;
pub use event::{IncomingEvent, UNKNOWN_EVENT_TYPE};
