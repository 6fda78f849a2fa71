//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the relay core and the outside world. Adapters implement these ports.
//!
//! - `MessageBroker` / `QueueSubscription` - the durable queue being consumed
//! - `EventPublisher` - putting events on that queue
//! - `EventHandler` - what the consumer hands decoded events to
//! - `SubscriberSink` - one live real-time subscriber connection

mod event_handler;
mod event_publisher;
mod message_queue;
mod subscriber_sink;

pub use event_handler::{EventHandler, HandlerError};
pub use event_publisher::EventPublisher;
pub use message_queue::{Delivery, DeliveryTag, MessageBroker, QueueError, QueueSubscription};
pub use subscriber_sink::{DeliveryError, SubscriberSink};
