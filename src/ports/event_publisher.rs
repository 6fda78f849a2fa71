//! EventPublisher port - Interface for putting events on the durable queue.
//!
//! The relay itself only consumes; producers (and tests) use this port to
//! enqueue events in the layout the consumer expects.

use async_trait::async_trait;

use crate::domain::relay::IncomingEvent;

use super::message_queue::{DeliveryTag, QueueError};

/// Port for publishing events to the queue.
///
/// # Example
///
/// ```ignore
/// let event = IncomingEvent::from_value(json!({"type": "NOTE_CREATED"}))?;
/// let tag = publisher.publish(&event).await?;
/// ```
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Enqueue a single event; returns the broker-assigned id.
    async fn publish(&self, event: &IncomingEvent) -> Result<DeliveryTag, QueueError>;
}
