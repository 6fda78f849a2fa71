//! Domain layer - value objects with no I/O.

pub mod foundation;
pub mod relay;
