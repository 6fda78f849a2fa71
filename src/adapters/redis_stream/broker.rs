//! Redis Streams consumer-group broker.
//!
//! The stream is the durable queue. A consumer group tracks which entries
//! were delivered to which consumer; entries stay in the group's pending
//! list until `XACK`. Reading with id `0` returns this consumer's pending
//! entries, reading with `>` returns new ones.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;

use crate::config::BrokerConfig;
use crate::ports::{Delivery, DeliveryTag, MessageBroker, QueueError, QueueSubscription};

/// Reads new, not yet delivered entries.
const NEW_ENTRIES: &str = ">";

/// Reads this consumer's pending entries from the start.
const PENDING_START: &str = "0";

/// Last-delivered id of a newly created group: the whole existing stream
/// is delivered, not only entries added after the group was created.
const GROUP_START: &str = "0";

/// Connection settings shared by every subscription.
#[derive(Debug, Clone)]
struct StreamSettings {
    stream: String,
    group: String,
    consumer: String,
    payload_field: String,
    batch_size: usize,
    block_ms: usize,
}

/// Broker backed by a Redis stream and consumer group.
#[derive(Debug, Clone)]
pub struct RedisStreamBroker {
    client: redis::Client,
    settings: StreamSettings,
}

impl RedisStreamBroker {
    /// Create a broker from configuration.
    ///
    /// Only parses the URL; no connection is made until `connect`.
    pub fn from_config(config: &BrokerConfig) -> Result<Self, QueueError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            settings: StreamSettings {
                stream: config.stream.clone(),
                group: config.group.clone(),
                consumer: config.consumer.clone(),
                payload_field: config.payload_field.clone(),
                batch_size: config.batch_size,
                block_ms: usize::try_from(config.block_ms).unwrap_or(usize::MAX),
            },
        })
    }

    /// Create the consumer group (and the stream) unless it exists.
    async fn declare_group(&self, conn: &mut MultiplexedConnection) -> Result<(), QueueError> {
        let created: Result<(), redis::RedisError> = conn
            .xgroup_create_mkstream(&self.settings.stream, &self.settings.group, GROUP_START)
            .await;

        match created {
            Ok(()) => {
                tracing::info!(
                    stream = %self.settings.stream,
                    group = %self.settings.group,
                    "Created consumer group"
                );
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(QueueError::Command(e.to_string())),
        }
    }
}

#[async_trait]
impl MessageBroker for RedisStreamBroker {
    async fn connect(&self) -> Result<Box<dyn QueueSubscription>, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        self.declare_group(&mut conn).await?;

        Ok(Box::new(RedisStreamSubscription {
            conn,
            settings: self.settings.clone(),
        }))
    }

    fn queue_name(&self) -> &str {
        &self.settings.stream
    }
}

/// A consumer attached to the group over one multiplexed connection.
pub struct RedisStreamSubscription {
    conn: MultiplexedConnection,
    settings: StreamSettings,
}

impl RedisStreamSubscription {
    async fn read(&mut self, start: &str, block: bool) -> Result<Vec<Delivery>, QueueError> {
        let mut options = StreamReadOptions::default()
            .group(&self.settings.group, &self.settings.consumer)
            .count(self.settings.batch_size);
        if block {
            options = options.block(self.settings.block_ms);
        }

        let reply: Option<StreamReadReply> = self
            .conn
            .xread_options(&[&self.settings.stream], &[start], &options)
            .await
            .map_err(command_error)?;

        Ok(reply
            .map(|reply| {
                reply
                    .keys
                    .into_iter()
                    .flat_map(|key| key.ids)
                    .map(|entry| to_delivery(entry, &self.settings.payload_field))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl QueueSubscription for RedisStreamSubscription {
    async fn pending(&mut self) -> Result<Vec<Delivery>, QueueError> {
        let mut deliveries = Vec::new();
        let mut cursor = PENDING_START.to_string();

        loop {
            let page = self.read(&cursor, false).await?;
            match page.last() {
                Some(last) => cursor = last.tag.as_str().to_string(),
                None => break,
            }
            deliveries.extend(page);
        }

        Ok(deliveries)
    }

    async fn next_batch(&mut self) -> Result<Vec<Delivery>, QueueError> {
        self.read(NEW_ENTRIES, true).await
    }

    async fn ack(&mut self, tag: &DeliveryTag) -> Result<(), QueueError> {
        let _acked: u64 = self
            .conn
            .xack(&self.settings.stream, &self.settings.group, &[tag.as_str()])
            .await
            .map_err(command_error)?;
        Ok(())
    }
}

fn command_error(e: redis::RedisError) -> QueueError {
    if e.is_connection_dropped() || e.is_io_error() {
        QueueError::Connection(e.to_string())
    } else {
        QueueError::Command(e.to_string())
    }
}

/// Pending entries whose data was trimmed from the stream come back without
/// fields; they surface as body-less deliveries.
fn to_delivery(entry: StreamId, payload_field: &str) -> Delivery {
    let body = entry
        .map
        .get(payload_field)
        .and_then(|value| redis::from_redis_value::<Vec<u8>>(value).ok());
    Delivery::new(DeliveryTag::new(entry.id), body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn entry(id: &str, fields: &[(&str, &str)]) -> StreamId {
        let map: HashMap<String, redis::Value> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), redis::Value::Data(v.as_bytes().to_vec())))
            .collect();
        StreamId {
            id: id.to_string(),
            map,
        }
    }

    #[test]
    fn to_delivery_reads_payload_field() {
        let delivery = to_delivery(entry("1-0", &[("body", r#"{"type":"PING"}"#)]), "body");

        assert_eq!(delivery.tag.as_str(), "1-0");
        assert_eq!(delivery.decode().unwrap().event_type(), "PING");
    }

    #[test]
    fn to_delivery_without_field_has_no_body() {
        let delivery = to_delivery(entry("2-0", &[("other", "x")]), "body");
        assert!(delivery.body.is_none());
    }

    #[test]
    fn from_config_rejects_unparseable_url() {
        let config = BrokerConfig {
            url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            RedisStreamBroker::from_config(&config),
            Err(QueueError::Connection(_))
        ));
    }

    #[test]
    fn from_config_keeps_queue_name() {
        let broker = RedisStreamBroker::from_config(&BrokerConfig::default()).unwrap();
        assert_eq!(broker.queue_name(), "notebook_events");
    }
}
