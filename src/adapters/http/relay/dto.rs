//! HTTP DTOs for the relay's administrative endpoints.

use serde::{Deserialize, Serialize};

use crate::application::ConsumerState;

/// Plain-text body of `GET /health`.
pub const LIVENESS_BODY: &str = "Realtime backend running";

/// Response for `POST /events`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAccepted {
    pub ok: bool,
}

impl EventAccepted {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// Response for `GET /health/ready`.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// `ready` when the queue consumer is connected, `degraded` otherwise.
    pub status: &'static str,
    /// Queue consumer state.
    pub consumer: ConsumerState,
    /// Currently registered subscribers.
    pub subscribers: usize,
    /// Process start time (RFC 3339).
    pub started_at: String,
    /// Seconds since start.
    pub uptime_secs: i64,
}

/// Standard error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn invalid_event(message: impl Into<String>) -> Self {
        Self::new("INVALID_EVENT", message)
    }
}
