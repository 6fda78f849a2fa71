//! Queue consumer health, shared with the readiness endpoint.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use serde::Serialize;

/// Lifecycle state of the queue consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerState {
    Starting,
    Connected,
    Reconnecting,
    Failed,
    Stopped,
}

impl ConsumerState {
    fn as_u8(self) -> u8 {
        match self {
            ConsumerState::Starting => 0,
            ConsumerState::Connected => 1,
            ConsumerState::Reconnecting => 2,
            ConsumerState::Failed => 3,
            ConsumerState::Stopped => 4,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ConsumerState::Connected,
            2 => ConsumerState::Reconnecting,
            3 => ConsumerState::Failed,
            4 => ConsumerState::Stopped,
            _ => ConsumerState::Starting,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumerState::Starting => "starting",
            ConsumerState::Connected => "connected",
            ConsumerState::Reconnecting => "reconnecting",
            ConsumerState::Failed => "failed",
            ConsumerState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free health record updated by the consumer loop.
#[derive(Debug, Default)]
pub struct ConsumerHealth {
    state: AtomicU8,
    processed: AtomicU64,
    malformed: AtomicU64,
    unacked: AtomicU64,
}

/// Point-in-time copy of [`ConsumerHealth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub state: ConsumerState,
    pub processed: u64,
    pub malformed: u64,
    pub unacked: u64,
}

impl ConsumerHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConsumerState {
        ConsumerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: ConsumerState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConsumerState::Connected
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unacked(&self) {
        self.unacked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            state: self.state(),
            processed: self.processed.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            unacked: self.unacked.load(Ordering::Relaxed),
        }
    }
}
