//! In-memory adapters for testing and local development.

mod broker;

pub use broker::InMemoryBroker;
