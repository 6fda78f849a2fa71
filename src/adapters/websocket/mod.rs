//! WebSocket adapters for real-time event delivery.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │             QueueConsumer            │        POST /events           │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                     │
//!                                     │ dispatch
//!                                     ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         Dispatcher                                   │
//! │   - Wraps the event into { type, payload }                          │
//! │   - try_deliver to every registered ChannelSink                     │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                     │
//!                                     │ bounded mpsc per connection
//!                                     ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │   writer task ─► socket     writer task ─► socket     ...           │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`sink`] - Bounded outbound queue implementing `SubscriberSink`
//! - [`handler`] - Axum WebSocket upgrade handler

pub mod handler;
pub mod sink;

pub use handler::{websocket_router, ws_fallback, ws_handler, WebSocketState};
pub use sink::{channel, ChannelSink, OutboundFrames};
