//! HTTP adapters - REST API implementations.

pub mod relay;

// Re-export key types for convenience
pub use relay::{build_app, relay_router, RelayAppState};
