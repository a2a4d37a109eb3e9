//! Bounded, deduplicating operation queue.

use indexmap::IndexMap;
use pagesync_protocol::SyncOperation;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Pending operations keyed by `side:entity_key`.
///
/// Re-enqueuing a key replaces the stored operation in place, so the
/// latest event wins and keeps the original position.
#[derive(Debug)]
pub struct SyncQueue {
    entries: Mutex<IndexMap<String, SyncOperation>>,
    max_size: usize,
    dropped: AtomicU64,
}

impl SyncQueue {
    /// Creates a queue holding at most `max_size` distinct keys.
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            max_size,
            dropped: AtomicU64::new(0),
        }
    }

    /// Adds or replaces an operation. Returns false when the queue is full
    /// and the key is new; the operation is then dropped and counted.
    pub fn enqueue(&self, op: SyncOperation) -> bool {
        let key = op.queue_key();
        let mut entries = self.entries.lock();
        if let Some(slot) = entries.get_mut(&key) {
            *slot = op;
            return true;
        }
        if entries.len() >= self.max_size {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(key = %key, dropped, "sync queue full, dropping operation");
            return false;
        }
        entries.insert(key, op);
        true
    }

    /// Puts back an operation that could not run yet. A newer operation
    /// for the same key takes precedence, so this only inserts when the
    /// key is absent. The size bound still applies.
    pub fn requeue(&self, op: SyncOperation) -> bool {
        let key = op.queue_key();
        let mut entries = self.entries.lock();
        if entries.contains_key(&key) {
            return false;
        }
        if entries.len() >= self.max_size {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(key = %key, "sync queue full, dropping deferred operation");
            return false;
        }
        entries.insert(key, op);
        true
    }

    /// Removes and returns all operations in insertion order.
    pub fn drain(&self) -> Vec<SyncOperation> {
        let mut entries = self.entries.lock();
        std::mem::take(&mut *entries).into_values().collect()
    }

    /// Number of pending operations.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Operations dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Queue bound.
    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagesync_protocol::OperationKind;

    fn op(kind: OperationKind, key: &str, ts: i64) -> SyncOperation {
        SyncOperation::new(kind, key, ts)
    }

    #[test]
    fn latest_operation_per_key_wins() {
        let queue = SyncQueue::new(10);
        assert!(queue.enqueue(op(OperationKind::FileAdded, "/p/a.md", 1)));
        assert!(queue.enqueue(op(OperationKind::FileModified, "/p/b.md", 2)));
        assert!(queue.enqueue(op(OperationKind::FileModified, "/p/a.md", 3)));
        assert_eq!(queue.len(), 2);

        let drained = queue.drain();
        assert_eq!(drained[0].entity_key, "/p/a.md");
        assert_eq!(drained[0].kind, OperationKind::FileModified);
        assert_eq!(drained[0].timestamp, 3);
        assert_eq!(drained[1].entity_key, "/p/b.md");
        assert!(queue.is_empty());
    }

    #[test]
    fn sides_do_not_collide() {
        let queue = SyncQueue::new(10);
        queue.enqueue(op(OperationKind::FileModified, "x", 1));
        queue.enqueue(op(OperationKind::PageUpdated, "x", 2));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn full_queue_drops_new_keys_but_replaces_existing() {
        let queue = SyncQueue::new(2);
        assert!(queue.enqueue(op(OperationKind::FileModified, "a", 1)));
        assert!(queue.enqueue(op(OperationKind::FileModified, "b", 1)));
        assert!(!queue.enqueue(op(OperationKind::FileModified, "c", 1)));
        assert_eq!(queue.dropped(), 1);

        assert!(queue.enqueue(op(OperationKind::FileRemoved, "a", 2)));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.max_size(), 2);
    }

    #[test]
    fn requeue_yields_to_newer_operation() {
        let queue = SyncQueue::new(10);
        queue.enqueue(op(OperationKind::FileModified, "a", 5));
        assert!(!queue.requeue(op(OperationKind::FileModified, "a", 1)));
        assert!(queue.requeue(op(OperationKind::PageUpdated, "b", 1)));

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].timestamp, 5);
    }

    #[test]
    fn drain_empties_queue() {
        let queue = SyncQueue::new(3);
        queue.enqueue(op(OperationKind::PageDeleted, "page-1", 1));
        assert_eq!(queue.drain().len(), 1);
        assert!(queue.drain().is_empty());
    }
}
