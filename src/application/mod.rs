//! Application layer - the relay's moving parts.
//!
//! This layer coordinates between ports: the consumer pulls from a
//! `MessageBroker` and feeds an `EventHandler`; the dispatcher is that
//! handler and pushes to `SubscriberSink`s held in the registry.

mod backoff;
mod consumer;
mod dispatcher;
mod health;
mod registry;

pub use backoff::ReconnectPolicy;
pub use consumer::{Outcome, QueueConsumer};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use health::{ConsumerHealth, ConsumerState, HealthSnapshot};
pub use registry::{RegistryError, SubscriberRegistry};
