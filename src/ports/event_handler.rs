//! EventHandler port - Interface for processing relay events.
//!
//! The queue consumer hands every decoded message to an `EventHandler`
//! and acknowledges the message only after `handle` returns `Ok`.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::relay::IncomingEvent;

/// Failure reported by an event handler.
///
/// A message whose handler fails is left unacknowledged so the broker
/// redelivers it.
#[derive(Debug, Error)]
#[error("{handler}: {message}")]
pub struct HandlerError {
    pub handler: &'static str,
    pub message: String,
}

impl HandlerError {
    pub fn new(handler: &'static str, message: impl Into<String>) -> Self {
        Self {
            handler,
            message: message.into(),
        }
    }
}

/// Handler for processing incoming events.
///
/// # Example
///
/// ```ignore
/// struct AuditLog;
///
/// #[async_trait]
/// impl EventHandler for AuditLog {
///     async fn handle(&self, event: IncomingEvent) -> Result<(), HandlerError> {
///         tracing::info!(event_type = event.event_type(), "seen");
///         Ok(())
///     }
///
///     fn name(&self) -> &'static str {
///         "AuditLog"
///     }
/// }
/// ```
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process an event.
    async fn handle(&self, event: IncomingEvent) -> Result<(), HandlerError>;

    /// Handler name for logging.
    fn name(&self) -> &'static str;
}
