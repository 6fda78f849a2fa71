//! Fan-out configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Fan-out configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Frames buffered per subscriber before it counts as stalled
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

impl RelayConfig {
    /// Validate fan-out configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.subscriber_buffer == 0 {
            return Err(ValidationError::InvalidSubscriberBuffer);
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

fn default_subscriber_buffer() -> usize {
    256
}
