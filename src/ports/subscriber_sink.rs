//! SubscriberSink port - capability set of one live subscriber connection.
//!
//! The dispatcher never talks to a transport directly. It only needs to ask
//! whether a connection is still open, hand it a frame without blocking, and
//! close it. Anything that can do those three things can be registered.

use thiserror::Error;

use crate::domain::relay::Frame;

/// Why a frame could not be handed to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("subscriber connection is closed")]
    Closed,

    #[error("subscriber outbound buffer is full")]
    Backlogged,

    #[error("transport error: {0}")]
    Transport(String),
}

impl DeliveryError {
    /// Whether the subscriber should be dropped from the registry.
    ///
    /// Closed connections are gone; backlogged ones are treated as stalled
    /// clients and disconnected. Transport errors only skip this frame.
    pub fn evicts(&self) -> bool {
        matches!(self, DeliveryError::Closed | DeliveryError::Backlogged)
    }
}

/// One live subscriber connection.
///
/// `try_deliver` must not block: it enqueues the frame or fails at once.
pub trait SubscriberSink: Send + Sync {
    /// Whether the connection still accepts frames.
    fn is_open(&self) -> bool;

    /// Hands a frame to the connection.
    fn try_deliver(&self, frame: Frame) -> Result<(), DeliveryError>;

    /// Closes the connection. Idempotent.
    fn close(&self);
}
