//! Frame Queue
//!
//! FIFO hand-off of raw frames from the connection manager task to consumer
//! threads. Unbounded by default; with a capacity, frames arriving while the
//! queue is full are dropped and counted.
//!
//! The queue closes once the connection manager stops. Consumers drain what
//! is left, then see `None`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use tokio::sync::{Mutex, mpsc};

use crate::application::ports::FrameSource;
use crate::infrastructure::metrics;

/// Result of offering a frame to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Frame queued.
    Queued,
    /// Bounded queue full; frame dropped.
    Dropped,
    /// Every consumer handle is gone.
    Closed,
}

/// Create a frame queue. `capacity == 0` means unbounded.
#[must_use]
pub fn frame_queue(capacity: usize) -> (FrameTx, FrameQueue) {
    let depth = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = if capacity == 0 {
        let (tx, rx) = mpsc::unbounded_channel();
        (Sender::Unbounded(tx), Receiver::Unbounded(rx))
    } else {
        let (tx, rx) = mpsc::channel(capacity);
        (Sender::Bounded(tx), Receiver::Bounded(rx))
    };

    (
        FrameTx {
            inner: tx,
            depth: Arc::clone(&depth),
        },
        FrameQueue {
            rx: Arc::new(Mutex::new(rx)),
            depth,
        },
    )
}

// =============================================================================
// Producer
// =============================================================================

#[derive(Debug)]
enum Sender {
    Unbounded(mpsc::UnboundedSender<Bytes>),
    Bounded(mpsc::Sender<Bytes>),
}

/// Producer half, owned by the connection manager.
#[derive(Debug)]
pub struct FrameTx {
    inner: Sender,
    depth: Arc<AtomicUsize>,
}

impl FrameTx {
    /// Offer a frame without waiting.
    pub fn push(&self, frame: Bytes) -> PushOutcome {
        self.depth.fetch_add(1, Ordering::AcqRel);

        let outcome = match &self.inner {
            Sender::Unbounded(tx) => match tx.send(frame) {
                Ok(()) => PushOutcome::Queued,
                Err(_) => PushOutcome::Closed,
            },
            Sender::Bounded(tx) => match tx.try_send(frame) {
                Ok(()) => PushOutcome::Queued,
                Err(mpsc::error::TrySendError::Full(_)) => PushOutcome::Dropped,
                Err(mpsc::error::TrySendError::Closed(_)) => PushOutcome::Closed,
            },
        };

        let depth = if outcome == PushOutcome::Queued {
            self.depth.load(Ordering::Acquire)
        } else {
            self.depth.fetch_sub(1, Ordering::AcqRel).saturating_sub(1)
        };
        metrics::set_frame_queue_depth(depth);
        outcome
    }
}

// =============================================================================
// Consumer
// =============================================================================

#[derive(Debug)]
enum Receiver {
    Unbounded(mpsc::UnboundedReceiver<Bytes>),
    Bounded(mpsc::Receiver<Bytes>),
}

impl Receiver {
    async fn recv(&mut self) -> Option<Bytes> {
        match self {
            Self::Unbounded(rx) => rx.recv().await,
            Self::Bounded(rx) => rx.recv().await,
        }
    }

    fn blocking_recv(&mut self) -> Option<Bytes> {
        match self {
            Self::Unbounded(rx) => rx.blocking_recv(),
            Self::Bounded(rx) => rx.blocking_recv(),
        }
    }
}

/// Consumer handle. Cheap to clone; clones share one FIFO, so each frame is
/// delivered to exactly one caller.
#[derive(Debug, Clone)]
pub struct FrameQueue {
    rx: Arc<Mutex<Receiver>>,
    depth: Arc<AtomicUsize>,
}

impl FrameQueue {
    /// Block the calling thread until a frame is available.
    ///
    /// Returns `None` once the connection manager has stopped and the queue
    /// is drained.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context. Use
    /// [`FrameQueue::recv`] there, or call this from `spawn_blocking` or a
    /// plain thread.
    #[must_use]
    pub fn next_frame(&self) -> Option<Bytes> {
        let frame = self.rx.blocking_lock().blocking_recv();
        self.taken(frame)
    }

    /// Wait for the next frame without blocking the thread.
    pub async fn recv(&self) -> Option<Bytes> {
        let frame = self.rx.lock().await.recv().await;
        self.taken(frame)
    }

    /// Frames waiting to be taken.
    #[must_use]
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Check if no frames are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn taken(&self, frame: Option<Bytes>) -> Option<Bytes> {
        if frame.is_some() {
            let depth = self.depth.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
            metrics::set_frame_queue_depth(depth);
        }
        frame
    }
}

impl FrameSource for FrameQueue {
    fn next_frame(&self) -> Option<Bytes> {
        Self::next_frame(self)
    }
}
