//! Per-page FIFO write locks.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
struct Slot {
    mutex: Arc<AsyncMutex<()>>,
    /// Holders plus waiters still awaiting the mutex.
    users: usize,
}

type LockMap = Arc<Mutex<HashMap<String, Slot>>>;

/// Serializes writes per remote page. Waiters are served in arrival order
/// and an entry is dropped once its last holder or waiter goes away.
#[derive(Debug, Default, Clone)]
pub struct PageLocks {
    locks: LockMap,
}

impl PageLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `page_id`.
    ///
    /// Cancel-safe: dropping the future before it resolves releases the
    /// waiter's claim on the entry.
    pub async fn lock(&self, page_id: &str) -> PageGuard {
        let mutex = {
            let mut locks = self.locks.lock();
            let slot = locks.entry(page_id.to_string()).or_default();
            slot.users += 1;
            Arc::clone(&slot.mutex)
        };
        let mut page = PageGuard {
            page_id: page_id.to_string(),
            guard: None,
            locks: Arc::clone(&self.locks),
        };
        page.guard = Some(mutex.lock_owned().await);
        page
    }

    /// Number of pages with a holder or waiter.
    pub fn active(&self) -> usize {
        self.locks.lock().len()
    }
}

/// Exclusive access to one page until dropped.
#[derive(Debug)]
pub struct PageGuard {
    page_id: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: LockMap,
}

impl PageGuard {
    /// The locked page.
    pub fn page_id(&self) -> &str {
        &self.page_id
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock();
        let idle = match locks.get_mut(&self.page_id) {
            Some(slot) => {
                slot.users = slot.users.saturating_sub(1);
                slot.users == 0
            }
            None => false,
        };
        if idle {
            locks.remove(&self.page_id);
        }
    }
}
