//! Route configuration for the relay.
//!
//! Configures the Axum router for the administrative endpoints and the
//! WebSocket upgrade, and wraps it in the HTTP middleware stack.

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::adapters::websocket::websocket_router;
use crate::config::ServerConfig;

use super::handlers::{health, post_event, readiness, RelayAppState};

/// Creates the relay router with all endpoints.
///
/// Routes:
/// - `GET /` and `GET /ws` - WebSocket upgrade
/// - `GET /health` - Liveness
/// - `GET /health/ready` - Queue consumer readiness
/// - `POST /events` - Direct event injection
/// - any other path - WebSocket upgrade, 404 otherwise
pub fn relay_router() -> Router<RelayAppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/events", post(post_event))
        .merge(websocket_router::<RelayAppState>())
}

/// Build the complete application with state and middleware.
///
/// With no configured CORS origins any origin is allowed.
pub fn build_app(state: RelayAppState, config: &ServerConfig) -> Router {
    relay_router()
        .with_state(state)
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(cors_layer(config))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins_list()
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
