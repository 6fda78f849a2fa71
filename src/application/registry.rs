//! Registry of live subscriber connections.
//!
//! The registry is the single owner of subscriber connections. The WebSocket
//! handler registers a connection when the upgrade completes and unregisters
//! it when the transport closes; the dispatcher iterates it on every event.
//!
//! ```text
//! Registry
//! ├── subscriber-a  (open)
//! ├── subscriber-b  (open)
//! └── subscriber-c  (closed, removed on next cleanup)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::foundation::SubscriberId;
use crate::ports::SubscriberSink;

/// Errors from registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("subscriber registry is shut down")]
    ShutDown,
}

struct RegistryState {
    subscribers: HashMap<SubscriberId, Arc<dyn SubscriberSink>>,
    accepting: bool,
}

/// Live set of subscriber connections.
///
/// # Thread Safety
///
/// Uses `RwLock` since dispatch passes (reads) vastly outnumber connects
/// and disconnects (writes). Sinks never block, so the read lock is never
/// held across I/O.
pub struct SubscriberRegistry {
    state: RwLock<RegistryState>,
}

impl SubscriberRegistry {
    /// Create an empty registry that accepts registrations.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState {
                subscribers: HashMap::new(),
                accepting: true,
            }),
        }
    }

    /// Create as an Arc (for sharing between listener and dispatcher).
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Add a connection to the live set.
    ///
    /// No capacity limit is enforced. Fails only after [`shutdown`](Self::shutdown).
    pub async fn register(
        &self,
        sink: Arc<dyn SubscriberSink>,
    ) -> Result<SubscriberId, RegistryError> {
        let mut state = self.state.write().await;
        if !state.accepting {
            return Err(RegistryError::ShutDown);
        }

        let id = SubscriberId::new();
        state.subscribers.insert(id, sink);
        Ok(id)
    }

    /// Remove a connection.
    ///
    /// Idempotent: returns `false` when the id was not registered.
    pub async fn unregister(&self, id: &SubscriberId) -> bool {
        self.state.write().await.subscribers.remove(id).is_some()
    }

    /// Remove several connections at once, returning how many were present.
    pub async fn unregister_all(&self, ids: &[SubscriberId]) -> usize {
        let mut state = self.state.write().await;
        ids.iter()
            .filter(|id| state.subscribers.remove(id).is_some())
            .count()
    }

    /// Visit every registered connection under the read lock.
    ///
    /// Iteration order is unspecified.
    pub async fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&SubscriberId, &Arc<dyn SubscriberSink>),
    {
        let state = self.state.read().await;
        for (id, sink) in state.subscribers.iter() {
            visit(id, sink);
        }
    }

    /// Whether a connection is currently registered.
    pub async fn contains(&self, id: &SubscriberId) -> bool {
        self.state.read().await.subscribers.contains_key(id)
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.state.read().await.subscribers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether new registrations are still accepted.
    pub async fn is_accepting(&self) -> bool {
        self.state.read().await.accepting
    }

    /// Close every connection and stop accepting new ones.
    ///
    /// Returns the number of connections that were closed.
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<Arc<dyn SubscriberSink>> = {
            let mut state = self.state.write().await;
            state.accepting = false;
            state.subscribers.drain().map(|(_, sink)| sink).collect()
        };

        for sink in &drained {
            sink.close();
        }
        drained.len()
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::relay::Frame;
    use crate::ports::DeliveryError;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct StubSink {
        closed: AtomicBool,
    }

    impl SubscriberSink for StubSink {
        fn is_open(&self) -> bool {
            !self.closed.load(Ordering::SeqCst)
        }

        fn try_deliver(&self, _frame: Frame) -> Result<(), DeliveryError> {
            Ok(())
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn stub() -> Arc<StubSink> {
        Arc::new(StubSink::default())
    }

    #[tokio::test]
    async fn register_adds_subscriber() {
        let registry = SubscriberRegistry::new();

        let id = registry.register(stub()).await.unwrap();

        assert!(registry.contains(&id).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn register_assigns_distinct_ids() {
        let registry = SubscriberRegistry::new();

        let a = registry.register(stub()).await.unwrap();
        let b = registry.register(stub()).await.unwrap();

        assert_ne!(a, b);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn unregister_removes_subscriber() {
        let registry = SubscriberRegistry::new();
        let id = registry.register(stub()).await.unwrap();

        assert!(registry.unregister(&id).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn unregister_twice_is_noop() {
        let registry = SubscriberRegistry::new();
        let keep = registry.register(stub()).await.unwrap();
        let gone = registry.register(stub()).await.unwrap();

        assert!(registry.unregister(&gone).await);
        assert!(!registry.unregister(&gone).await);

        assert_eq!(registry.len().await, 1);
        assert!(registry.contains(&keep).await);
    }

    #[tokio::test]
    async fn unregister_unknown_is_noop() {
        let registry = SubscriberRegistry::new();
        assert!(!registry.unregister(&SubscriberId::new()).await);
    }

    #[tokio::test]
    async fn unregister_all_counts_present_only() {
        let registry = SubscriberRegistry::new();
        let a = registry.register(stub()).await.unwrap();
        let b = registry.register(stub()).await.unwrap();

        let removed = registry
            .unregister_all(&[a, b, SubscriberId::new()])
            .await;

        assert_eq!(removed, 2);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn for_each_visits_every_subscriber() {
        let registry = SubscriberRegistry::new();
        for _ in 0..3 {
            registry.register(stub()).await.unwrap();
        }

        let mut visited = 0;
        registry.for_each(|_, _| visited += 1).await;

        assert_eq!(visited, 3);
    }

    #[tokio::test]
    async fn shutdown_closes_all_and_rejects_new() {
        let registry = SubscriberRegistry::new();
        let a = stub();
        let b = stub();
        registry.register(a.clone()).await.unwrap();
        registry.register(b.clone()).await.unwrap();

        let closed = registry.shutdown().await;

        assert_eq!(closed, 2);
        assert!(!a.is_open());
        assert!(!b.is_open());
        assert!(registry.is_empty().await);
        assert!(!registry.is_accepting().await);
        assert_eq!(
            registry.register(stub()).await,
            Err(RegistryError::ShutDown)
        );
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    proptest! {
        #[test]
        fn unregister_is_idempotent(total in 1usize..16, pick in 0usize..16, repeats in 1usize..4) {
            let (once, many) = block_on(async {
                let once = SubscriberRegistry::new();
                let many = SubscriberRegistry::new();
                let mut once_ids = Vec::new();
                let mut many_ids = Vec::new();
                for _ in 0..total {
                    once_ids.push(once.register(stub()).await.unwrap());
                    many_ids.push(many.register(stub()).await.unwrap());
                }

                let target = pick % total;
                once.unregister(&once_ids[target]).await;
                for _ in 0..repeats {
                    many.unregister(&many_ids[target]).await;
                }

                (once.len().await, many.len().await)
            });

            prop_assert_eq!(once, many);
            prop_assert_eq!(once, total - 1);
        }
    }
}
