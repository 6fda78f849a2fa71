//! HTTP handlers for the relay's administrative endpoints.

use std::sync::Arc;

use axum::extract::{rejection::JsonRejection, FromRef, Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;

use crate::adapters::websocket::WebSocketState;
use crate::application::{ConsumerHealth, Dispatcher};
use crate::domain::foundation::Timestamp;
use crate::domain::relay::{EventError, IncomingEvent};

use super::dto::{ErrorResponse, EventAccepted, ReadinessResponse, LIVENESS_BODY};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for the relay's HTTP and WebSocket endpoints.
#[derive(Clone)]
pub struct RelayAppState {
    pub dispatcher: Arc<Dispatcher>,
    pub consumer_health: Arc<ConsumerHealth>,
    pub subscriber_buffer: usize,
    pub started_at: Timestamp,
}

impl RelayAppState {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        consumer_health: Arc<ConsumerHealth>,
        subscriber_buffer: usize,
    ) -> Self {
        Self {
            dispatcher,
            consumer_health,
            subscriber_buffer,
            started_at: Timestamp::now(),
        }
    }
}

impl FromRef<RelayAppState> for WebSocketState {
    fn from_ref(state: &RelayAppState) -> Self {
        WebSocketState::new(state.dispatcher.clone(), state.subscriber_buffer)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts to HTTP responses.
#[derive(Debug)]
pub enum RelayApiError {
    /// Body could not be extracted as JSON (syntax, content type, size).
    Rejected(JsonRejection),
    /// Body is JSON but not an event.
    InvalidEvent(EventError),
}

impl From<JsonRejection> for RelayApiError {
    fn from(rejection: JsonRejection) -> Self {
        RelayApiError::Rejected(rejection)
    }
}

impl From<EventError> for RelayApiError {
    fn from(err: EventError) -> Self {
        RelayApiError::InvalidEvent(err)
    }
}

impl IntoResponse for RelayApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            RelayApiError::Rejected(rejection) => {
                (rejection.status(), ErrorResponse::invalid_event(rejection.body_text()))
            }
            RelayApiError::InvalidEvent(err) => {
                (StatusCode::BAD_REQUEST, ErrorResponse::invalid_event(err.to_string()))
            }
        };

        (status, Json(error)).into_response()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// GET /health - Liveness check
pub async fn health() -> &'static str {
    LIVENESS_BODY
}

/// GET /health/ready - Queue consumer readiness
pub async fn readiness(State(state): State<RelayAppState>) -> impl IntoResponse {
    let consumer = state.consumer_health.state();
    let connected = state.consumer_health.is_connected();

    let response = ReadinessResponse {
        status: if connected { "ready" } else { "degraded" },
        consumer,
        subscribers: state.dispatcher.registry().len().await,
        started_at: state.started_at.to_rfc3339(),
        uptime_secs: Timestamp::now().duration_since(&state.started_at).num_seconds(),
    };

    let status = if connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// POST /events - Inject an event directly into the dispatcher
pub async fn post_event(
    State(state): State<RelayAppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<EventAccepted>, RelayApiError> {
    let Json(value) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection.body_text(), "Rejected event body");
        rejection
    })?;
    let event = IncomingEvent::from_value(value)?;

    let report = state.dispatcher.dispatch(event).await;
    tracing::debug!(delivered = report.delivered, "Direct event dispatched");

    Ok(Json(EventAccepted::ok()))
}
