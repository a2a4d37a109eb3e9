//! # PageSync Store
//!
//! Local persistent state for the PageSync engine, kept in a single SQLite
//! database:
//!
//! ```text
//! entities        # local path ↔ remote id map, hashes, merge base, conflicts
//! content_blobs   # content-addressed normalized text (merge bases, variants)
//! sync_wal        # one row per in-flight push / pull / merge
//! sync_log        # append-only audit trail
//! issue_snapshots # per-project state for the issue-sync collaborator
//! ```
//!
//! ## Key Invariants
//!
//! - `local_path` and `remote_id` are unique across live and soft-deleted rows
//! - Identical normalized content is stored once
//! - A WAL row is durable only once committed and deleted
//! - Only one process opens a store file for writing at a time

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod content;
mod entity;
mod error;
mod schema;
mod snapshot;
mod store;
mod sync_log;
mod wal;

pub use content::ContentBlob;
pub use entity::{ConflictMarker, ConflictRecord, Entity, EntityType, NewEntity, SyncUpdate};
pub use error::{StoreError, StoreResult};
pub use snapshot::IssueSnapshot;
pub use store::{now_millis, Store};
pub use sync_log::{Direction, LogEntry, LogOperation, LogQuery, DEFAULT_LOG_LIMIT};
pub use wal::{WalEntry, WalOperation, WalState};
