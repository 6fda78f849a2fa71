//! Queue consumer: broker -> handler, acknowledging after processing.
//!
//! # Lifecycle
//!
//! ```text
//! connect ──► drain pending ──► read new ──► process one by one ──┐
//!    ▲                              ▲                              │
//!    │ backoff                      └──────────────────────────────┘
//!    └── connection error
//! ```
//!
//! A message is acknowledged only after the handler returned. Malformed
//! messages are acknowledged and dropped. A failing handler leaves the
//! message pending; it is redelivered by the pending drain after the next
//! reconnect.

use std::sync::Arc;

use tokio::sync::watch;

use crate::ports::{Delivery, EventHandler, MessageBroker, QueueError, QueueSubscription};

use super::backoff::ReconnectPolicy;
use super::health::{ConsumerHealth, ConsumerState};

/// What happened to a single delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Handled and acknowledged.
    Acked,
    /// Malformed; acknowledged without being handled.
    Dropped,
    /// Handler failed; left pending for redelivery.
    Unacked,
}

/// Why a connected session ended.
enum SessionEnd {
    Shutdown,
    Lost(QueueError),
}

/// Long-running consumer of the durable queue.
pub struct QueueConsumer {
    broker: Arc<dyn MessageBroker>,
    handler: Arc<dyn EventHandler>,
    policy: ReconnectPolicy,
    health: Arc<ConsumerHealth>,
}

impl QueueConsumer {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        handler: Arc<dyn EventHandler>,
        policy: ReconnectPolicy,
        health: Arc<ConsumerHealth>,
    ) -> Self {
        Self {
            broker,
            handler,
            policy,
            health,
        }
    }

    pub fn health(&self) -> &Arc<ConsumerHealth> {
        &self.health
    }

    /// Consume until shutdown is signalled or reconnecting is given up.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::RetriesExhausted` after the policy's maximum
    /// number of consecutive failed sessions. A session fails when the
    /// connection, or the first read on it, fails.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), QueueError> {
        let queue = self.broker.queue_name().to_string();
        let mut failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let opened = tokio::select! {
                _ = shutdown.changed() => break,
                opened = self.open_session() => opened,
            };

            let error = match opened {
                Ok((subscription, pending)) => {
                    failures = 0;
                    self.health.set_state(ConsumerState::Connected);
                    tracing::info!(
                        queue = %queue,
                        handler = self.handler.name(),
                        "Queue consumer connected"
                    );

                    match self.consume(subscription, pending, &mut shutdown).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Lost(e) => e,
                    }
                }
                Err(e) => e,
            };

            failures += 1;
            if !self.policy.allows_retry(failures) {
                self.health.set_state(ConsumerState::Failed);
                tracing::error!(
                    queue = %queue,
                    attempts = failures,
                    error = %error,
                    "Queue consumer giving up; no further events will be received"
                );
                return Err(QueueError::RetriesExhausted { attempts: failures });
            }

            let delay = self.policy.delay_for(failures);
            self.health.set_state(ConsumerState::Reconnecting);
            tracing::warn!(
                queue = %queue,
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Queue connection failed, retrying"
            );

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.health.set_state(ConsumerState::Stopped);
        tracing::info!(queue = %queue, "Queue consumer stopped");
        Ok(())
    }

    /// Connect and read this consumer's pending entries.
    ///
    /// A session counts as established only once both succeed; a broker that
    /// accepts connections but fails every read keeps counting as a failure.
    async fn open_session(
        &self,
    ) -> Result<(Box<dyn QueueSubscription>, Vec<Delivery>), QueueError> {
        let mut subscription = self.broker.connect().await?;
        let pending = subscription.pending().await?;
        Ok((subscription, pending))
    }

    async fn consume(
        &self,
        mut subscription: Box<dyn QueueSubscription>,
        pending: Vec<Delivery>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        if !pending.is_empty() {
            tracing::info!(count = pending.len(), "Redelivering pending messages");
        }
        for delivery in pending {
            if let Err(e) = self.process(subscription.as_mut(), delivery).await {
                return SessionEnd::Lost(e);
            }
        }

        loop {
            if *shutdown.borrow() {
                return SessionEnd::Shutdown;
            }

            let batch = tokio::select! {
                _ = shutdown.changed() => return SessionEnd::Shutdown,
                batch = subscription.next_batch() => batch,
            };

            let batch = match batch {
                Ok(batch) => batch,
                Err(e) => return SessionEnd::Lost(e),
            };

            for delivery in batch {
                if let Err(e) = self.process(subscription.as_mut(), delivery).await {
                    return SessionEnd::Lost(e);
                }
            }
        }
    }

    /// Decode, handle and acknowledge one delivery.
    ///
    /// # Errors
    ///
    /// Only acknowledgment failures are returned; they mean the connection
    /// is unusable.
    pub async fn process(
        &self,
        subscription: &mut dyn QueueSubscription,
        delivery: Delivery,
    ) -> Result<Outcome, QueueError> {
        let event = match delivery.decode() {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    delivery_id = %delivery.tag,
                    error = %e,
                    "Dropping malformed message"
                );
                subscription.ack(&delivery.tag).await?;
                self.health.record_malformed();
                return Ok(Outcome::Dropped);
            }
        };

        let event_type = event.event_type().to_string();
        if let Err(e) = self.handler.handle(event).await {
            tracing::error!(
                delivery_id = %delivery.tag,
                event_type = %event_type,
                error = %e,
                "Handler failed, leaving message unacknowledged"
            );
            self.health.record_unacked();
            return Ok(Outcome::Unacked);
        }

        subscription.ack(&delivery.tag).await?;
        self.health.record_processed();
        tracing::debug!(delivery_id = %delivery.tag, event_type = %event_type, "Message processed");
        Ok(Outcome::Acked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBroker;
    use crate::domain::relay::IncomingEvent;
    use crate::ports::{DeliveryTag, EventPublisher, HandlerError};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Handler that records event types and can be told to fail.
    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<String>>,
        failing: AtomicBool,
    }

    impl RecordingHandler {
        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, event: IncomingEvent) -> Result<(), HandlerError> {
            self.seen.lock().unwrap().push(event.event_type().to_string());
            if self.failing.load(Ordering::SeqCst) {
                return Err(HandlerError::new("RecordingHandler", "boom"));
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            "RecordingHandler"
        }
    }

    fn broker() -> InMemoryBroker {
        InMemoryBroker::with_limits("test", 8, Duration::from_millis(20))
    }

    fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy::new(Duration::from_millis(1), Duration::from_millis(5), max_attempts)
    }

    fn consumer(
        broker: &InMemoryBroker,
        handler: Arc<RecordingHandler>,
        policy: ReconnectPolicy,
    ) -> QueueConsumer {
        QueueConsumer::new(
            Arc::new(broker.clone()),
            handler,
            policy,
            Arc::new(ConsumerHealth::new()),
        )
    }

    async fn publish(broker: &InMemoryBroker, kind: &str) -> DeliveryTag {
        let event = IncomingEvent::from_value(json!({ "type": kind })).unwrap();
        broker.publish(&event).await.unwrap()
    }

    async fn wait_until<F, Fut>(mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if condition().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn process_acks_after_handler_returns() {
        let broker = broker();
        let handler = Arc::new(RecordingHandler::default());
        let consumer = consumer(&broker, handler.clone(), fast_policy(0));
        let tag = publish(&broker, "PING").await;
        let mut subscription = broker.connect().await.unwrap();
        let delivery = subscription.next_batch().await.unwrap().remove(0);

        let outcome = consumer.process(subscription.as_mut(), delivery).await.unwrap();

        assert_eq!(outcome, Outcome::Acked);
        assert_eq!(handler.seen(), vec!["PING"]);
        assert_eq!(broker.acked().await, vec![tag]);
        assert_eq!(consumer.health().snapshot().processed, 1);
    }

    #[tokio::test]
    async fn failing_handler_leaves_message_unacked() {
        let broker = broker();
        let handler = Arc::new(RecordingHandler::default());
        handler.failing.store(true, Ordering::SeqCst);
        let consumer = consumer(&broker, handler.clone(), fast_policy(0));
        publish(&broker, "PING").await;
        let mut subscription = broker.connect().await.unwrap();
        let delivery = subscription.next_batch().await.unwrap().remove(0);

        let outcome = consumer.process(subscription.as_mut(), delivery).await.unwrap();

        assert_eq!(outcome, Outcome::Unacked);
        assert!(broker.acked().await.is_empty());
        assert_eq!(broker.pending_count().await, 1);
        assert_eq!(consumer.health().snapshot().unacked, 1);
    }

    #[tokio::test]
    async fn malformed_message_is_acked_and_dropped() {
        let broker = broker();
        let handler = Arc::new(RecordingHandler::default());
        let consumer = consumer(&broker, handler.clone(), fast_policy(0));
        let not_json = broker.push_raw(Some(b"not json".to_vec())).await;
        let scalar = broker.push_raw(Some(b"42".to_vec())).await;
        let no_body = broker.push_raw(None).await;
        let mut subscription = broker.connect().await.unwrap();

        for delivery in subscription.next_batch().await.unwrap() {
            let outcome = consumer.process(subscription.as_mut(), delivery).await.unwrap();
            assert_eq!(outcome, Outcome::Dropped);
        }

        assert!(handler.seen().is_empty());
        assert_eq!(broker.acked().await, vec![not_json, scalar, no_body]);
        assert_eq!(consumer.health().snapshot().malformed, 3);
    }

    #[tokio::test]
    async fn run_processes_in_delivery_order() {
        let broker = broker();
        let handler = Arc::new(RecordingHandler::default());
        let consumer = consumer(&broker, handler.clone(), fast_policy(0));
        for kind in ["E1", "E2", "E3"] {
            publish(&broker, kind).await;
        }
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(async move { consumer.run(rx).await });
        let queue = &broker;
        wait_until(|| async move { queue.acked().await.len() == 3 }).await;
        tx.send(true).unwrap();

        assert!(task.await.unwrap().is_ok());
        assert_eq!(handler.seen(), vec!["E1", "E2", "E3"]);
    }

    #[tokio::test]
    async fn unacked_message_is_redelivered_after_reconnect() {
        let broker = broker();
        let handler = Arc::new(RecordingHandler::default());
        handler.failing.store(true, Ordering::SeqCst);
        let consumer = consumer(&broker, handler.clone(), fast_policy(5));
        let tag = publish(&broker, "RETRY_ME").await;
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(async move { consumer.run(rx).await });
        let recorder = &handler;
        let queue = &broker;
        wait_until(|| async move { recorder.seen().len() == 1 }).await;
        assert!(broker.acked().await.is_empty());

        handler.failing.store(false, Ordering::SeqCst);
        broker.drop_connections().await;
        wait_until(|| async move { queue.acked().await.len() == 1 }).await;
        tx.send(true).unwrap();

        assert!(task.await.unwrap().is_ok());
        assert_eq!(handler.seen(), vec!["RETRY_ME", "RETRY_ME"]);
        assert_eq!(broker.acked().await, vec![tag]);
        assert!(broker.connect_count().await >= 2);
    }

    #[tokio::test]
    async fn reconnects_after_transient_failures() {
        let broker = broker();
        broker.fail_next_connects(2).await;
        let handler = Arc::new(RecordingHandler::default());
        let consumer = consumer(&broker, handler.clone(), fast_policy(3));
        let health = consumer.health().clone();
        publish(&broker, "PING").await;
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(async move { consumer.run(rx).await });
        let queue = &broker;
        wait_until(|| async move { queue.acked().await.len() == 1 }).await;
        assert!(health.is_connected());
        tx.send(true).unwrap();

        assert!(task.await.unwrap().is_ok());
        assert_eq!(health.state(), ConsumerState::Stopped);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let broker = broker();
        broker.fail_next_connects(10).await;
        let handler = Arc::new(RecordingHandler::default());
        let consumer = consumer(&broker, handler, fast_policy(2));
        let health = consumer.health().clone();
        let (_tx, rx) = watch::channel(false);

        let result = consumer.run(rx).await;

        assert!(matches!(
            result,
            Err(QueueError::RetriesExhausted { attempts: 3 })
        ));
        assert_eq!(health.state(), ConsumerState::Failed);
        assert_eq!(broker.connect_count().await, 0);
    }

    #[tokio::test]
    async fn array_message_is_handled_as_unknown_event() {
        let broker = broker();
        let handler = Arc::new(RecordingHandler::default());
        let consumer = consumer(&broker, handler.clone(), fast_policy(0));
        let tag = broker.push_raw(Some(b"[1,2]".to_vec())).await;
        let mut subscription = broker.connect().await.unwrap();
        let delivery = subscription.next_batch().await.unwrap().remove(0);

        let outcome = consumer.process(subscription.as_mut(), delivery).await.unwrap();

        assert_eq!(outcome, Outcome::Acked);
        assert_eq!(handler.seen(), vec!["UNKNOWN_EVENT"]);
        assert_eq!(broker.acked().await, vec![tag]);
    }

    #[tokio::test]
    async fn sessions_failing_on_first_read_exhaust_retries_with_backoff() {
        let broker = broker();
        broker.fail_next_sessions(10).await;
        let policy = ReconnectPolicy::new(Duration::from_millis(10), Duration::from_secs(1), 3);
        let consumer = consumer(&broker, Arc::new(RecordingHandler::default()), policy);
        let health = consumer.health().clone();
        let (_tx, rx) = watch::channel(false);
        let started = tokio::time::Instant::now();

        let result = tokio::time::timeout(Duration::from_secs(5), consumer.run(rx))
            .await
            .expect("consumer kept retrying a broken session");

        assert!(matches!(
            result,
            Err(QueueError::RetriesExhausted { attempts: 4 })
        ));
        // 10 + 20 + 40 ms between the four sessions
        assert!(started.elapsed() >= Duration::from_millis(70));
        assert_eq!(broker.connect_count().await, 4);
        assert_eq!(health.state(), ConsumerState::Failed);
    }

    #[tokio::test]
    async fn recovered_session_resets_failure_count() {
        let broker = broker();
        broker.fail_next_sessions(2).await;
        let handler = Arc::new(RecordingHandler::default());
        let consumer = consumer(&broker, handler, fast_policy(2));
        let health = consumer.health().clone();
        publish(&broker, "PING").await;
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(async move { consumer.run(rx).await });
        let queue = &broker;
        wait_until(|| async move { queue.acked().await.len() == 1 }).await;

        // Lost session plus one failed reopen stays within the limit only
        // because the healthy session above reset the count.
        broker.fail_next_sessions(1).await;
        broker.drop_connections().await;
        publish(&broker, "PONG").await;
        wait_until(|| async move { queue.acked().await.len() == 2 }).await;
        tx.send(true).unwrap();

        assert!(task.await.unwrap().is_ok());
        assert_eq!(health.state(), ConsumerState::Stopped);
    }

    #[tokio::test]
    async fn no_retry_policy_fails_on_first_error() {
        let broker = broker();
        broker.fail_next_connects(1).await;
        let consumer = consumer(
            &broker,
            Arc::new(RecordingHandler::default()),
            ReconnectPolicy::no_retry(),
        );
        let (_tx, rx) = watch::channel(false);

        let result = consumer.run(rx).await;

        assert!(matches!(
            result,
            Err(QueueError::RetriesExhausted { attempts: 1 })
        ));
    }

    #[tokio::test]
    async fn shutdown_stops_idle_consumer() {
        let broker = InMemoryBroker::with_limits("test", 8, Duration::from_secs(30));
        let consumer = consumer(&broker, Arc::new(RecordingHandler::default()), fast_policy(0));
        let health = consumer.health().clone();
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(async move { consumer.run(rx).await });
        let status = &health;
        wait_until(|| async move { status.is_connected() }).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("consumer did not stop")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(health.state(), ConsumerState::Stopped);
    }
}
