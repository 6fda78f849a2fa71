//! MessageQueue ports - Interface to the durable broker feeding the relay.
//!
//! ## Contract
//!
//! 1. `MessageBroker::connect` opens a connection and declares the durable
//!    queue (idempotently). Each call yields a fresh subscription.
//! 2. `QueueSubscription::pending` returns messages this consumer received
//!    earlier but never acknowledged, in delivery order.
//! 3. `QueueSubscription::next_batch` waits for new messages; an empty batch
//!    means the wait timed out.
//! 4. `QueueSubscription::ack` removes a message from the pending set.
//!    Unacknowledged messages are redelivered after a reconnect.
//!
//! Any `QueueError` from a subscription means the connection is unusable.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::relay::{EventError, IncomingEvent};

/// Broker-assigned identity of one delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryTag(String);

impl DeliveryTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One message as handed over by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: DeliveryTag,

    /// Raw message body; `None` when the broker entry carries no body.
    pub body: Option<Vec<u8>>,
}

impl Delivery {
    pub fn new(tag: DeliveryTag, body: Option<Vec<u8>>) -> Self {
        Self { tag, body }
    }

    /// Parses the body into an event.
    pub fn decode(&self) -> Result<IncomingEvent, EventError> {
        let body = self.body.as_deref().ok_or(EventError::MissingBody)?;
        IncomingEvent::from_slice(body)
    }
}

/// Errors that can occur talking to the broker.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("broker connection failed: {0}")]
    Connection(String),

    #[error("broker command failed: {0}")]
    Command(String),

    #[error("broker connection closed")]
    Closed,

    #[error("event could not be encoded: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("gave up reconnecting after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

/// Port for connecting to the durable queue.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Connect and declare the queue.
    async fn connect(&self) -> Result<Box<dyn QueueSubscription>, QueueError>;

    /// Queue name, for logs.
    fn queue_name(&self) -> &str;
}

/// A live consumer attached to the durable queue.
#[async_trait]
pub trait QueueSubscription: Send {
    /// Messages received earlier by this consumer but never acknowledged.
    async fn pending(&mut self) -> Result<Vec<Delivery>, QueueError>;

    /// Waits for new messages. Empty when the wait timed out.
    async fn next_batch(&mut self) -> Result<Vec<Delivery>, QueueError>;

    /// Acknowledges a message.
    async fn ack(&mut self, tag: &DeliveryTag) -> Result<(), QueueError>;
}
