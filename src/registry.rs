//! Book-keeping for open control channels, so teardown can force-close all
//! of them instead of leaking tasks blocked on reads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;

/// Receiving half handed to the channel task. A message (or channel close)
/// means "shut down now"; the task races it against its socket read.
pub type CloseSignal = mpsc::UnboundedReceiver<()>;

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    inner: Mutex<HashMap<u64, mpsc::UnboundedSender<()>>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new control channel. The returned signal fires when the
    /// channel is force-closed; dropping the registry entry closes it too,
    /// so a task blocked on the signal always wakes.
    pub fn register(&self) -> (u64, CloseSignal) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .lock()
            .expect("registry mutex poisoned")
            .insert(id, tx);
        (id, rx)
    }

    /// Idempotent: unregistering an absent id is a no-op.
    pub fn unregister(&self, id: u64) {
        self.inner
            .lock()
            .expect("registry mutex poisoned")
            .remove(&id);
    }

    /// Force-close every registered channel, best effort, and clear the
    /// registry. Iterates a drained snapshot, never the live map.
    pub fn close_all(&self) -> usize {
        let drained: Vec<(u64, mpsc::UnboundedSender<()>)> = {
            let mut inner = self.inner.lock().expect("registry mutex poisoned");
            inner.drain().collect()
        };
        let count = drained.len();
        for (_, tx) in drained {
            // The task may already be gone; that is fine.
            let _ = tx.send(());
        }
        count
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("registry mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_assigns_distinct_ids() {
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = registry.register();
        let (second, _rx2) = registry.register();
        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (id, _rx) = registry.register();

        registry.unregister(id);
        registry.unregister(id);
        registry.unregister(9999);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn close_all_signals_every_channel_and_empties_the_registry() {
        let registry = ConnectionRegistry::new();
        let (_id1, mut rx1) = registry.register();
        let (_id2, mut rx2) = registry.register();
        let (_id3, mut rx3) = registry.register();

        assert_eq!(registry.close_all(), 3);
        assert!(registry.is_empty());

        // Each channel either got the explicit signal or saw its sender
        // dropped; both wake a blocked task.
        assert!(rx1.recv().await.is_some());
        assert!(rx2.recv().await.is_some());
        assert!(rx3.recv().await.is_some());
        assert!(rx1.recv().await.is_none());
    }

    #[tokio::test]
    async fn close_all_tolerates_already_gone_tasks() {
        let registry = ConnectionRegistry::new();
        let (_id, rx) = registry.register();
        drop(rx);

        assert_eq!(registry.close_all(), 1);
        assert!(registry.is_empty());

        // The registry is still usable afterwards.
        let (_id, _rx) = registry.register();
        assert_eq!(registry.len(), 1);
    }
}
