//! Bounded per-connection outbound queue.
//!
//! The dispatcher side holds a [`ChannelSink`]; the connection's writer task
//! drains the matching [`OutboundFrames`]. A full queue means the writer is
//! not keeping up with the socket, which the dispatcher treats as a stalled
//! subscriber.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;

use crate::domain::relay::Frame;
use crate::ports::{DeliveryError, SubscriberSink};

struct Shared {
    closed: AtomicBool,
    close_signal: Notify,
}

/// Dispatcher-facing half of a connection.
pub struct ChannelSink {
    frames: mpsc::Sender<Frame>,
    shared: Arc<Shared>,
}

/// Writer-facing half of a connection.
pub struct OutboundFrames {
    frames: mpsc::Receiver<Frame>,
    shared: Arc<Shared>,
}

/// Create a connected sink/receiver pair holding at most `capacity` frames.
pub fn channel(capacity: usize) -> (ChannelSink, OutboundFrames) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let shared = Arc::new(Shared {
        closed: AtomicBool::new(false),
        close_signal: Notify::new(),
    });

    (
        ChannelSink {
            frames: tx,
            shared: Arc::clone(&shared),
        },
        OutboundFrames { frames: rx, shared },
    )
}

impl SubscriberSink for ChannelSink {
    fn is_open(&self) -> bool {
        !self.shared.closed.load(Ordering::Acquire) && !self.frames.is_closed()
    }

    fn try_deliver(&self, frame: Frame) -> Result<(), DeliveryError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(DeliveryError::Closed);
        }

        self.frames.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Backlogged,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            self.shared.close_signal.notify_one();
        }
    }
}

impl OutboundFrames {
    /// Next frame to write, or `None` once the connection was closed.
    ///
    /// Closing takes priority over frames still queued.
    pub async fn next(&mut self) -> Option<Frame> {
        if self.shared.closed.load(Ordering::Acquire) {
            return None;
        }

        tokio::select! {
            biased;
            _ = self.shared.close_signal.notified() => None,
            frame = self.frames.recv() => frame,
        }
    }

    /// Whether the dispatcher side closed this connection.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}
