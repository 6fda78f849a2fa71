//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `RELAY` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use realtime_events::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {:?}", config.server.socket_addr());
//! ```

mod broker;
mod error;
mod relay;
mod server;

pub use broker::{BrokerConfig, MEMORY_BROKER_SCHEME};
pub use error::{ConfigError, ValidationError};
pub use relay::RelayConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
///
/// Every section has working defaults, so an empty environment yields a
/// relay on port 4001 consuming `notebook_events` from a local Redis.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Broker configuration (queue connection and reconnect policy)
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Fan-out configuration
    #[serde(default)]
    pub relay: RelayConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `RELAY` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `RELAY__SERVER__PORT=4001` -> `server.port = 4001`
    /// - `RELAY__BROKER__URL=redis://...` -> `broker.url = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("RELAY")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.broker.validate()?;
        self.relay.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to ensure tests don't run in parallel (env vars are global)
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to clear environment variables after testing
    fn clear_env() {
        env::remove_var("RELAY__SERVER__PORT");
        env::remove_var("RELAY__SERVER__ENVIRONMENT");
        env::remove_var("RELAY__BROKER__URL");
        env::remove_var("RELAY__BROKER__STREAM");
        env::remove_var("RELAY__BROKER__MAX_RECONNECT_ATTEMPTS");
        env::remove_var("RELAY__RELAY__SUBSCRIBER_BUFFER");
    }

    #[test]
    fn test_load_with_empty_environment_uses_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let result = AppConfig::load();

        assert!(result.is_ok(), "Failed to load config: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.server.port, 4001);
        assert_eq!(config.broker.stream, "notebook_events");
        assert_eq!(config.relay.subscriber_buffer, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::set_var("RELAY__BROKER__URL", "redis://queue.internal:6379");
        env::set_var("RELAY__BROKER__STREAM", "notes");
        env::set_var("RELAY__BROKER__MAX_RECONNECT_ATTEMPTS", "3");
        env::set_var("RELAY__RELAY__SUBSCRIBER_BUFFER", "64");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.broker.url, "redis://queue.internal:6379");
        assert_eq!(config.broker.stream, "notes");
        assert_eq!(config.broker.max_reconnect_attempts, 3);
        assert_eq!(config.relay.subscriber_buffer, 64);
    }

    #[test]
    fn test_is_production() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::set_var("RELAY__SERVER__ENVIRONMENT", "production");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert!(config.is_production());
    }

    #[test]
    fn test_custom_server_port() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::set_var("RELAY__SERVER__PORT", "3000");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_validate_rejects_bad_section() {
        let mut config = AppConfig::default();
        config.broker.url = "amqp://localhost".to_string();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidBrokerUrl)
        ));
    }
}
