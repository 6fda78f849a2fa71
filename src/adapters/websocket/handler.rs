//! WebSocket upgrade handler for real-time subscribers.
//!
//! Handles the HTTP → WebSocket upgrade and manages the connection lifecycle:
//! 1. Upgrade to WebSocket
//! 2. Register a bounded sink with the dispatcher
//! 3. Write broadcast frames until either side closes
//! 4. Close the sink and unregister

use std::sync::Arc;

use crate::ports::SubscriberSink;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        FromRef, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};

use crate::application::Dispatcher;

use super::sink::{channel, ChannelSink};

/// State required for WebSocket handling.
///
/// Extracted from the application state.
#[derive(Clone)]
pub struct WebSocketState {
    /// Dispatcher owning the subscriber registry.
    pub dispatcher: Arc<Dispatcher>,
    /// Outbound frames buffered per connection.
    pub subscriber_buffer: usize,
}

impl WebSocketState {
    pub fn new(dispatcher: Arc<Dispatcher>, subscriber_buffer: usize) -> Self {
        Self {
            dispatcher,
            subscriber_buffer,
        }
    }
}

/// Handle WebSocket upgrade requests.
///
/// Routes: `GET /` and `GET /ws`, plus any other path via [`ws_fallback`]
///
/// No authentication: every client that completes the upgrade receives
/// every broadcast.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WebSocketState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Upgrade requests on unrouted paths; anything else is a plain 404.
pub async fn ws_fallback(
    upgrade: Option<WebSocketUpgrade>,
    state: State<WebSocketState>,
) -> Response {
    match upgrade {
        Some(ws) => ws_handler(ws, state).await,
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Handle an established WebSocket connection.
///
/// Runs for the lifetime of the connection. Client text frames are
/// ignored; a close frame or transport error ends the connection.
async fn handle_socket(socket: WebSocket, state: WebSocketState) {
    let (sink, mut outbound) = channel(state.subscriber_buffer);
    let sink: Arc<ChannelSink> = Arc::new(sink);

    let subscriber_id = match state.dispatcher.register(sink.clone()).await {
        Ok(id) => id,
        Err(e) => {
            tracing::debug!(error = %e, "Rejecting WebSocket connection");
            let _ = socket.close().await;
            return;
        }
    };
    tracing::info!(subscriber_id = %subscriber_id, "Subscriber connected");

    let (mut sender, mut receiver) = socket.split();

    // Forward broadcast frames to the client
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.next().await {
            if let Err(e) = sender.send(Message::Text(frame.to_string())).await {
                tracing::debug!(
                    subscriber_id = %subscriber_id,
                    error = %e,
                    "Send error, closing connection"
                );
                return;
            }
        }

        // Closed from the server side (shutdown or stalled)
        let _ = sender.send(Message::Close(None)).await;
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(_)) | Ok(Message::Binary(_)) => {
                    tracing::trace!(subscriber_id = %subscriber_id, "Ignoring client message");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // Handled automatically by axum
                }
                Ok(Message::Close(_)) => {
                    tracing::debug!(subscriber_id = %subscriber_id, "Client sent close frame");
                    break;
                }
                Err(e) => {
                    tracing::debug!(subscriber_id = %subscriber_id, "Receive error: {}", e);
                    break;
                }
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    sink.close();
    state.dispatcher.unregister(&subscriber_id).await;
    tracing::info!(subscriber_id = %subscriber_id, "Subscriber disconnected");
}

/// Create axum router for the WebSocket endpoints.
///
/// # Example
///
/// ```ignore
/// let app = Router::new()
///     .merge(websocket_router())
///     .with_state(app_state);
/// ```
pub fn websocket_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    WebSocketState: FromRef<S>,
{
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .fallback(ws_fallback)
}
