//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the relay to external systems:
//! - `redis_stream` - Redis Streams broker and publisher
//! - `memory` - In-process broker (tests, local runs)
//! - `websocket` - Subscriber connections
//! - `http` - Administrative endpoints and router assembly

pub mod http;
pub mod memory;
pub mod redis_stream;
pub mod websocket;

use std::sync::Arc;

use crate::config::BrokerConfig;
use crate::ports::{MessageBroker, QueueError};

pub use memory::InMemoryBroker;
pub use redis_stream::{RedisStreamBroker, RedisStreamPublisher};

/// Select the broker adapter for the configured URL.
///
/// `memory://` selects the in-process broker; anything else is treated as
/// a Redis URL.
pub fn message_broker(config: &BrokerConfig) -> Result<Arc<dyn MessageBroker>, QueueError> {
    if config.is_in_memory() {
        tracing::warn!("Using in-memory broker; events do not survive restarts");
        return Ok(Arc::new(InMemoryBroker::from_config(config)));
    }

    Ok(Arc::new(RedisStreamBroker::from_config(config)?))
}
