//! Errors raised while decoding relay events.

use thiserror::Error;

/// Why an incoming message could not be turned into an event.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("event body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("event must be a JSON object or array, got {found}")]
    NotStructured { found: &'static str },

    #[error("message carries no event body")]
    MissingBody,
}
