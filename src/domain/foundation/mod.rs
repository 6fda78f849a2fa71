//! Foundation value objects shared across the relay.

mod ids;
mod timestamp;

pub use ids::SubscriberId;
pub use timestamp::Timestamp;
