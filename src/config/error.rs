//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid listen address: {0}")]
    InvalidAddress(String),

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid broker URL format (expected redis://, rediss:// or memory://)")]
    InvalidBrokerUrl,

    #[error("Broker batch size must be at least 1")]
    InvalidBatchSize,

    #[error("Broker block timeout must be at least 1ms")]
    InvalidBlockTimeout,

    #[error("Initial backoff exceeds maximum backoff")]
    InvalidBackoff,

    #[error("Subscriber buffer must hold at least one frame")]
    InvalidSubscriberBuffer,
}
