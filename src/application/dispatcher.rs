//! Fan-out dispatcher pushing every event to every live subscriber.
//!
//! # Event Flow
//!
//! ```text
//! Queue consumer / POST /events
//!          │
//!          ▼
//! ┌────────────────────┐
//! │  Wrap into         │
//! │  BroadcastEnvelope │
//! └────────────────────┘
//!          │ serialized once
//!          ▼
//! ┌────────────────────┐
//! │  try_deliver to    │
//! │  each subscriber   │
//! └────────────────────┘
//!          │
//!          ▼
//! ┌────────────────────┐
//! │  Evict closed and  │
//! │  stalled entries   │
//! └────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::domain::foundation::SubscriberId;
use crate::domain::relay::{BroadcastEnvelope, Frame, IncomingEvent};
use crate::ports::{DeliveryError, EventHandler, HandlerError, SubscriberSink};

use super::registry::{RegistryError, SubscriberRegistry};

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Open subscribers a send was attempted to.
    pub attempted: usize,
    /// Sends that were accepted by the subscriber.
    pub delivered: usize,
    /// Subscribers that did not get this event (closed, stalled or failed).
    pub dropped: usize,
    /// Subscribers removed from the registry after the pass.
    pub evicted: usize,
}

/// Broadcasts events to the subscriber registry.
///
/// Passes are serialized so that every subscriber sees events in the
/// order `dispatch` was called.
pub struct Dispatcher {
    registry: Arc<SubscriberRegistry>,
    pass: Mutex<()>,
}

impl Dispatcher {
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self {
            registry,
            pass: Mutex::new(()),
        }
    }

    /// Create as an Arc (for sharing between HTTP state and consumer).
    pub fn new_shared(registry: Arc<SubscriberRegistry>) -> Arc<Self> {
        Arc::new(Self::new(registry))
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub async fn register(
        &self,
        sink: Arc<dyn SubscriberSink>,
    ) -> Result<SubscriberId, RegistryError> {
        let id = self.registry.register(sink).await?;
        tracing::debug!(subscriber_id = %id, "Subscriber registered");
        Ok(id)
    }

    pub async fn unregister(&self, id: &SubscriberId) -> bool {
        let removed = self.registry.unregister(id).await;
        if removed {
            tracing::debug!(subscriber_id = %id, "Subscriber unregistered");
        }
        removed
    }

    /// Broadcast an event to every registered subscriber.
    ///
    /// Never fails: per-subscriber problems are counted in the report.
    pub async fn dispatch(&self, event: IncomingEvent) -> DispatchReport {
        match self.try_dispatch(event).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize broadcast envelope");
                DispatchReport::default()
            }
        }
    }

    async fn try_dispatch(
        &self,
        event: IncomingEvent,
    ) -> Result<DispatchReport, serde_json::Error> {
        let envelope = BroadcastEnvelope::wrap(event);
        let frame = envelope.to_frame()?;

        let _pass = self.pass.lock().await;
        let (mut report, dead) = self.deliver_all(&frame).await;

        if !dead.is_empty() {
            report.evicted = self.registry.unregister_all(&dead).await;
        }

        tracing::debug!(
            event_type = %envelope.event_type,
            attempted = report.attempted,
            delivered = report.delivered,
            dropped = report.dropped,
            evicted = report.evicted,
            "Event dispatched"
        );
        Ok(report)
    }

    async fn deliver_all(&self, frame: &Frame) -> (DispatchReport, Vec<SubscriberId>) {
        let mut report = DispatchReport::default();
        let mut dead = Vec::new();

        self.registry
            .for_each(|id, sink| {
                if !sink.is_open() {
                    report.dropped += 1;
                    dead.push(*id);
                    return;
                }

                report.attempted += 1;
                match sink.try_deliver(frame.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        report.dropped += 1;
                        if e == DeliveryError::Backlogged {
                            tracing::warn!(
                                subscriber_id = %id,
                                "Subscriber stalled, disconnecting"
                            );
                            sink.close();
                        } else {
                            tracing::debug!(subscriber_id = %id, error = %e, "Send failed");
                        }
                        if e.evicts() {
                            dead.push(*id);
                        }
                    }
                }
            })
            .await;

        (report, dead)
    }
}

#[async_trait]
impl EventHandler for Dispatcher {
    async fn handle(&self, event: IncomingEvent) -> Result<(), HandlerError> {
        self.try_dispatch(event)
            .await
            .map(|_| ())
            .map_err(|e| HandlerError::new(self.name(), e.to_string()))
    }

    fn name(&self) -> &'static str {
        "Dispatcher"
    }
}
