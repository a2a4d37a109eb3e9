//! Status and health reporting types.

use crate::client::CircuitState;
use chrono::{DateTime, Utc};
use pagesync_store::WalEntry;
use serde::Serialize;

/// Queue and task snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    /// Operations waiting in the queue.
    pub pending: usize,
    /// True while a drain is processing operations.
    pub active: bool,
    /// Operations dropped because the queue was full.
    pub dropped: u64,
    /// True while the file watcher runs.
    pub watcher_active: bool,
    /// True while a poll cycle runs.
    pub polling: bool,
}

/// Result of one drain or forced sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Operations that completed.
    pub processed: usize,
    /// Operations that failed and were logged.
    pub failed: usize,
    /// Operations put back because the circuit was open.
    pub deferred: usize,
}

impl DrainReport {
    /// Total operations looked at.
    pub fn total(&self) -> usize {
        self.processed + self.failed + self.deferred
    }

    pub(crate) fn absorb(&mut self, other: DrainReport) {
        self.processed += other.processed;
        self.failed += other.failed;
        self.deferred += other.deferred;
    }
}

/// Result of a garbage collection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GcReport {
    /// Soft-deleted entities removed.
    pub entities: usize,
    /// Orphaned content blobs removed.
    pub blobs: usize,
}

/// Health snapshot for operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    /// Seconds since the engine was created.
    pub uptime_secs: u64,
    /// Whether the store passed its integrity check.
    pub store_ok: bool,
    /// Breaker state.
    pub circuit_state: CircuitState,
    /// Consecutive counted remote failures.
    pub consecutive_failures: u32,
    /// Last successful remote call.
    pub last_success: Option<DateTime<Utc>>,
    /// WAL rows not yet resolved.
    pub incomplete_wal: Vec<WalEntry>,
    /// Queue snapshot.
    pub queue: EngineStatus,
}

impl HealthReport {
    /// True when the store is sound, the circuit closed and no WAL row
    /// is left behind.
    pub fn is_healthy(&self) -> bool {
        self.store_ok && self.circuit_state.is_closed() && self.incomplete_wal.is_empty()
    }
}
