//! Publishes events onto the Redis stream the relay consumes.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::config::BrokerConfig;
use crate::domain::relay::IncomingEvent;
use crate::ports::{DeliveryTag, EventPublisher, QueueError};

/// Appends events with `XADD`, one entry per event, the JSON body stored
/// under the configured payload field.
#[derive(Clone)]
pub struct RedisStreamPublisher {
    conn: MultiplexedConnection,
    stream: String,
    payload_field: String,
}

impl RedisStreamPublisher {
    pub fn new(
        conn: MultiplexedConnection,
        stream: impl Into<String>,
        payload_field: impl Into<String>,
    ) -> Self {
        Self {
            conn,
            stream: stream.into(),
            payload_field: payload_field.into(),
        }
    }

    /// Connect using the broker section of the configuration.
    pub async fn connect(config: &BrokerConfig) -> Result<Self, QueueError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        Ok(Self::new(conn, &config.stream, &config.payload_field))
    }
}

#[async_trait]
impl EventPublisher for RedisStreamPublisher {
    async fn publish(&self, event: &IncomingEvent) -> Result<DeliveryTag, QueueError> {
        let body = serde_json::to_vec(event)?;
        let mut conn = self.conn.clone();

        let id: String = conn
            .xadd(&self.stream, "*", &[(self.payload_field.as_str(), body.as_slice())])
            .await
            .map_err(|e: redis::RedisError| QueueError::Command(e.to_string()))?;

        Ok(DeliveryTag::new(id))
    }
}

impl std::fmt::Debug for RedisStreamPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStreamPublisher")
            .field("stream", &self.stream)
            .field("payload_field", &self.payload_field)
            .finish_non_exhaustive()
    }
}
