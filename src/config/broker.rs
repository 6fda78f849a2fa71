//! Broker configuration (Redis Streams queue)

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// URL scheme selecting the in-process broker (local development, tests)
pub const MEMORY_BROKER_SCHEME: &str = "memory://";

/// Broker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Broker connection URL
    #[serde(default = "default_url")]
    pub url: String,

    /// Stream key acting as the durable queue
    #[serde(default = "default_stream")]
    pub stream: String,

    /// Consumer group reading the stream
    #[serde(default = "default_group")]
    pub group: String,

    /// Consumer name within the group; pending messages are tied to it
    #[serde(default = "default_consumer")]
    pub consumer: String,

    /// Stream entry field holding the JSON event body
    #[serde(default = "default_payload_field")]
    pub payload_field: String,

    /// Maximum messages fetched per read
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// How long a read blocks waiting for messages, in milliseconds
    #[serde(default = "default_block_ms")]
    pub block_ms: u64,

    /// First reconnect delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for the reconnect delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Consecutive failed connection attempts before giving up (0 = never retry)
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

impl BrokerConfig {
    /// Get block timeout as Duration
    pub fn block_timeout(&self) -> Duration {
        Duration::from_millis(self.block_ms)
    }

    /// Whether the in-process broker is selected
    pub fn is_in_memory(&self) -> bool {
        self.url.starts_with(MEMORY_BROKER_SCHEME)
    }

    /// Validate broker configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::MissingRequired("BROKER_URL"));
        }
        if !self.url.starts_with("redis://")
            && !self.url.starts_with("rediss://")
            && !self.is_in_memory()
        {
            return Err(ValidationError::InvalidBrokerUrl);
        }
        if self.stream.is_empty() {
            return Err(ValidationError::MissingRequired("BROKER_STREAM"));
        }
        if self.group.is_empty() {
            return Err(ValidationError::MissingRequired("BROKER_GROUP"));
        }
        if self.consumer.is_empty() {
            return Err(ValidationError::MissingRequired("BROKER_CONSUMER"));
        }
        if self.payload_field.is_empty() {
            return Err(ValidationError::MissingRequired("BROKER_PAYLOAD_FIELD"));
        }
        if self.batch_size == 0 {
            return Err(ValidationError::InvalidBatchSize);
        }
        if self.block_ms == 0 {
            return Err(ValidationError::InvalidBlockTimeout);
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(ValidationError::InvalidBackoff);
        }
        Ok(())
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            stream: default_stream(),
            group: default_group(),
            consumer: default_consumer(),
            payload_field: default_payload_field(),
            batch_size: default_batch_size(),
            block_ms: default_block_ms(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

fn default_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_stream() -> String {
    "notebook_events".to_string()
}

fn default_group() -> String {
    "realtime_relay".to_string()
}

fn default_consumer() -> String {
    "relay-1".to_string()
}

fn default_payload_field() -> String {
    "body".to_string()
}

fn default_batch_size() -> usize {
    16
}

fn default_block_ms() -> u64 {
    5_000
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_max_reconnect_attempts() -> u32 {
    10
}
