//! HTTP adapter for the relay.
//!
//! - `GET /health` - Liveness, plain text
//! - `GET /health/ready` - Queue consumer readiness
//! - `POST /events` - Inject an event directly into the dispatcher
//! - `GET /`, `GET /ws` - WebSocket subscription

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::{ErrorResponse, EventAccepted, ReadinessResponse, LIVENESS_BODY};
pub use handlers::{RelayApiError, RelayAppState};
pub use routes::{build_app, relay_router};
