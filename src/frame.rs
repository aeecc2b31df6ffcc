//! Single-slot latest-value frame cache: one producer, any number of
//! independent readers. Slow readers skip intermediate frames instead of
//! buffering them; the producer never waits.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::watch;

/// One encoded frame plus its position in the publish order. Cloning shares
/// the underlying bytes.
#[derive(Clone, Debug)]
pub struct Frame {
    pub seq: u64,
    pub bytes: Bytes,
}

#[derive(Debug)]
pub struct FrameSlot {
    tx: watch::Sender<Option<Frame>>,
    next_seq: AtomicU64,
}

impl FrameSlot {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            tx,
            next_seq: AtomicU64::new(1),
        }
    }

    /// Replace the current frame. Never blocks, even with zero readers.
    /// Returns the sequence number assigned to the published frame.
    pub fn publish(&self, bytes: Bytes) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.tx.send_replace(Some(Frame { seq, bytes }));
        seq
    }

    pub fn reader(&self) -> FrameReader {
        FrameReader {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// A reader's private view into the slot. Sequence numbers observed through
/// one reader never decrease.
#[derive(Clone, Debug)]
pub struct FrameReader {
    rx: watch::Receiver<Option<Frame>>,
}

impl FrameReader {
    /// Current frame, or `None` before the first publish. Never blocks.
    pub fn latest(&mut self) -> Option<Frame> {
        self.rx.borrow_and_update().clone()
    }

    /// Suspend until a publish newer than the last `latest()` call, or until
    /// the producer is gone (returns `false`).
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}
