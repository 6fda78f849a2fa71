//! Redis Streams adapters.
//!
//! - `RedisStreamBroker` - consumer-group reader implementing `MessageBroker`
//! - `RedisStreamPublisher` - `XADD` writer implementing `EventPublisher`

mod broker;
mod publisher;

pub use broker::{RedisStreamBroker, RedisStreamSubscription};
pub use publisher::RedisStreamPublisher;
