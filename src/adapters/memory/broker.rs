//! In-process queue with the same delivery semantics as the Redis stream.
//!
//! Messages move `ready -> pending -> acked`. A pending message belongs to
//! the consumer until it is acknowledged; after a reconnect it is handed
//! out again by `pending()`.
//!
//! Used by tests and by local runs with `RELAY__BROKER__URL=memory://`.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::config::BrokerConfig;
use crate::domain::relay::IncomingEvent;
use crate::ports::{
    Delivery, DeliveryTag, EventPublisher, MessageBroker, QueueError, QueueSubscription,
};

#[derive(Default)]
struct QueueState {
    next_seq: u64,
    ready: VecDeque<(u64, Option<Vec<u8>>)>,
    pending: BTreeMap<u64, Option<Vec<u8>>>,
    acked: Vec<DeliveryTag>,
    generation: u64,
    connects: u32,
    failing_connects: u32,
    failing_sessions: u32,
}

struct Inner {
    queue_name: String,
    batch_size: usize,
    block_timeout: Duration,
    state: Mutex<QueueState>,
    arrivals: Notify,
}

/// In-memory broker.
///
/// Cloning yields another handle to the same queue.
///
/// # Example
///
/// ```ignore
/// let broker = InMemoryBroker::new("notebook_events");
/// broker.publish(&event).await?;
///
/// let consumer = QueueConsumer::new(Arc::new(broker.clone()), handler, policy, health);
/// // ...
/// assert_eq!(broker.acked().await.len(), 1);
/// ```
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl InMemoryBroker {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self::with_limits(queue_name, 16, Duration::from_millis(100))
    }

    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::with_limits(
            config.stream.clone(),
            config.batch_size,
            config.block_timeout(),
        )
    }

    pub fn with_limits(
        queue_name: impl Into<String>,
        batch_size: usize,
        block_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue_name: queue_name.into(),
                batch_size: batch_size.max(1),
                block_timeout,
                state: Mutex::new(QueueState::default()),
                arrivals: Notify::new(),
            }),
        }
    }

    /// Enqueue a raw message body (`None` for an entry without a body).
    pub async fn push_raw(&self, body: Option<Vec<u8>>) -> DeliveryTag {
        let seq = {
            let mut state = self.inner.state.lock().await;
            state.next_seq += 1;
            let seq = state.next_seq;
            state.ready.push_back((seq, body));
            seq
        };
        self.inner.arrivals.notify_one();
        tag_for(seq)
    }

    // === Test Helpers ===

    /// Make the next `count` connection attempts fail.
    pub async fn fail_next_connects(&self, count: u32) {
        self.inner.state.lock().await.failing_connects = count;
    }

    /// Make the next `count` connections succeed but fail on every call.
    pub async fn fail_next_sessions(&self, count: u32) {
        self.inner.state.lock().await.failing_sessions = count;
    }

    /// Break every open subscription; their next call returns `Closed`.
    pub async fn drop_connections(&self) {
        self.inner.state.lock().await.generation += 1;
        self.inner.arrivals.notify_one();
    }

    /// Tags acknowledged so far, in acknowledgment order.
    pub async fn acked(&self) -> Vec<DeliveryTag> {
        self.inner.state.lock().await.acked.clone()
    }

    /// Messages delivered but not yet acknowledged.
    pub async fn pending_count(&self) -> usize {
        self.inner.state.lock().await.pending.len()
    }

    /// Messages not yet delivered.
    pub async fn ready_count(&self) -> usize {
        self.inner.state.lock().await.ready.len()
    }

    /// Successful connections so far.
    pub async fn connect_count(&self) -> u32 {
        self.inner.state.lock().await.connects
    }
}

fn tag_for(seq: u64) -> DeliveryTag {
    DeliveryTag::new(format!("{seq}-0"))
}

fn seq_of(tag: &DeliveryTag) -> Option<u64> {
    tag.as_str().split_once('-').and_then(|(seq, _)| seq.parse().ok())
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn connect(&self) -> Result<Box<dyn QueueSubscription>, QueueError> {
        let mut state = self.inner.state.lock().await;
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(QueueError::Connection(
                "in-memory broker refused connection".to_string(),
            ));
        }
        state.connects += 1;

        let broken = state.failing_sessions > 0;
        if broken {
            state.failing_sessions -= 1;
        }

        Ok(Box::new(InMemorySubscription {
            inner: Arc::clone(&self.inner),
            generation: state.generation,
            broken,
        }))
    }

    fn queue_name(&self) -> &str {
        &self.inner.queue_name
    }
}

#[async_trait]
impl EventPublisher for InMemoryBroker {
    async fn publish(&self, event: &IncomingEvent) -> Result<DeliveryTag, QueueError> {
        let body = serde_json::to_vec(event)?;
        Ok(self.push_raw(Some(body)).await)
    }
}

struct InMemorySubscription {
    inner: Arc<Inner>,
    generation: u64,
    broken: bool,
}

impl InMemorySubscription {
    fn ensure_live(&self, state: &QueueState) -> Result<(), QueueError> {
        if self.broken || state.generation != self.generation {
            return Err(QueueError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl QueueSubscription for InMemorySubscription {
    async fn pending(&mut self) -> Result<Vec<Delivery>, QueueError> {
        let state = self.inner.state.lock().await;
        self.ensure_live(&state)?;

        Ok(state
            .pending
            .iter()
            .map(|(seq, body)| Delivery::new(tag_for(*seq), body.clone()))
            .collect())
    }

    async fn next_batch(&mut self) -> Result<Vec<Delivery>, QueueError> {
        let deadline = tokio::time::Instant::now() + self.inner.block_timeout;

        loop {
            {
                let mut state = self.inner.state.lock().await;
                self.ensure_live(&state)?;

                if !state.ready.is_empty() {
                    let take = self.inner.batch_size.min(state.ready.len());
                    let batch: Vec<(u64, Option<Vec<u8>>)> = state.ready.drain(..take).collect();
                    for (seq, body) in &batch {
                        state.pending.insert(*seq, body.clone());
                    }
                    return Ok(batch
                        .into_iter()
                        .map(|(seq, body)| Delivery::new(tag_for(seq), body))
                        .collect());
                }
            }

            if tokio::time::timeout_at(deadline, self.inner.arrivals.notified())
                .await
                .is_err()
            {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&mut self, tag: &DeliveryTag) -> Result<(), QueueError> {
        let mut state = self.inner.state.lock().await;
        self.ensure_live(&state)?;

        if let Some(seq) = seq_of(tag) {
            if state.pending.remove(&seq).is_some() {
                state.acked.push(tag.clone());
            }
        }
        Ok(())
    }
}
