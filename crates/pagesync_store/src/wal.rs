//! Write-ahead log for push, pull and merge operations.
//!
//! Every mutating sync operation walks one row through
//! `pending → target_written → committed` and then deletes it. A row left in
//! `pending` or `target_written` marks an operation interrupted mid-flight; the
//! engine reports such rows but never replays them.

use crate::entity::{record_sync_on, SyncUpdate};
use crate::error::{StoreError, StoreResult};
use crate::store::{now_millis, Store};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Kind of operation protected by a WAL row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WalOperation {
    /// Local content written to the remote page.
    Push,
    /// Remote content written to the local file.
    Pull,
    /// Merged content written to both sides.
    Merge,
}

impl WalOperation {
    /// Returns the stored name.
    pub fn as_str(&self) -> &'static str {
        match self {
            WalOperation::Push => "push",
            WalOperation::Pull => "pull",
            WalOperation::Merge => "merge",
        }
    }
}

impl FromStr for WalOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(WalOperation::Push),
            "pull" => Ok(WalOperation::Pull),
            "merge" => Ok(WalOperation::Merge),
            other => Err(format!("unknown WAL operation: {other}")),
        }
    }
}

impl fmt::Display for WalOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of a WAL row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WalState {
    /// Intent recorded, target untouched.
    Pending,
    /// Target written, entity map not yet updated.
    TargetWritten,
    /// Entity map updated; the row may be deleted.
    Committed,
    /// Operation abandoned.
    RolledBack,
}

impl WalState {
    /// Returns the stored name.
    pub fn as_str(&self) -> &'static str {
        match self {
            WalState::Pending => "pending",
            WalState::TargetWritten => "target_written",
            WalState::Committed => "committed",
            WalState::RolledBack => "rolled_back",
        }
    }

    /// Returns true if a row in this state needs recovery attention.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, WalState::Pending | WalState::TargetWritten)
    }

    /// Returns the states from which a row may move to `target`.
    fn predecessors_of(target: WalState) -> &'static [WalState] {
        match target {
            WalState::Pending => &[],
            WalState::TargetWritten => &[WalState::Pending],
            WalState::Committed => &[WalState::TargetWritten],
            WalState::RolledBack => &[WalState::Pending, WalState::TargetWritten],
        }
    }
}

impl FromStr for WalState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WalState::Pending),
            "target_written" => Ok(WalState::TargetWritten),
            "committed" => Ok(WalState::Committed),
            "rolled_back" => Ok(WalState::RolledBack),
            other => Err(format!("unknown WAL state: {other}")),
        }
    }
}

impl fmt::Display for WalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A WAL row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalEntry {
    /// Row id.
    pub id: i64,
    /// Entity being synced.
    pub entity_id: i64,
    /// Protected operation.
    pub operation: WalOperation,
    /// Current state.
    pub state: WalState,
    /// Merge base before the operation.
    pub old_base_id: Option<i64>,
    /// Payload being applied.
    pub new_content: Option<String>,
    /// Creation time (Unix ms).
    pub created_at: i64,
    /// Commit or rollback time (Unix ms).
    pub completed_at: Option<i64>,
}

fn wal_from_row(row: &Row<'_>) -> rusqlite::Result<WalEntry> {
    let op: String = row.get(2)?;
    let state: String = row.get(3)?;
    Ok(WalEntry {
        id: row.get(0)?,
        entity_id: row.get(1)?,
        operation: op
            .parse()
            .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?,
        state: state
            .parse()
            .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into()))?,
        old_base_id: row.get(4)?,
        new_content: row.get(5)?,
        created_at: row.get(6)?,
        completed_at: row.get(7)?,
    })
}

const WAL_COLUMNS: &str =
    "id, entity_id, operation, state, old_base_id, new_content, created_at, completed_at";

fn transition(conn: &Connection, id: i64, to: WalState) -> StoreResult<()> {
    let from: Option<String> = conn
        .query_row("SELECT state FROM sync_wal WHERE id = ?1", [id], |row| row.get(0))
        .optional()?;
    let from = from.ok_or(StoreError::NotFound { kind: "WAL entry", id })?;

    let allowed = WalState::predecessors_of(to)
        .iter()
        .any(|state| state.as_str() == from);
    if !allowed {
        return Err(StoreError::InvalidTransition {
            id,
            from,
            to: to.as_str().to_string(),
        });
    }

    let completed_at = matches!(to, WalState::Committed | WalState::RolledBack).then(now_millis);
    conn.execute(
        "UPDATE sync_wal SET state = ?2, completed_at = COALESCE(?3, completed_at) WHERE id = ?1",
        params![id, to.as_str(), completed_at],
    )?;
    debug!(wal_id = id, state = %to, "WAL transition");
    Ok(())
}

impl Store {
    /// Records the intent to mutate an entity. Must precede any write.
    pub fn wal_begin(
        &self,
        entity_id: i64,
        operation: WalOperation,
        old_base_id: Option<i64>,
        new_content: &str,
    ) -> StoreResult<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO sync_wal (entity_id, operation, state, old_base_id, new_content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entity_id,
                operation.as_str(),
                WalState::Pending.as_str(),
                old_base_id,
                new_content,
                now_millis()
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(wal_id = id, entity_id, operation = %operation, "WAL pending");
        Ok(id)
    }

    /// Marks the target as written.
    pub fn wal_mark_target_written(&self, id: i64) -> StoreResult<()> {
        transition(&self.conn(), id, WalState::TargetWritten)
    }

    /// Marks the row committed.
    pub fn wal_mark_committed(&self, id: i64) -> StoreResult<()> {
        transition(&self.conn(), id, WalState::Committed)
    }

    /// Marks the row rolled back.
    pub fn wal_mark_rolled_back(&self, id: i64) -> StoreResult<()> {
        let result = transition(&self.conn(), id, WalState::RolledBack);
        if result.is_ok() {
            warn!(wal_id = id, "WAL entry rolled back");
        }
        result
    }

    /// Updates the entity and commits the WAL row in one transaction.
    pub fn wal_commit_sync(
        &self,
        wal_id: i64,
        entity_id: i64,
        update: &SyncUpdate,
    ) -> StoreResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        record_sync_on(&tx, entity_id, update)?;
        transition(&tx, wal_id, WalState::Committed)?;
        tx.commit()?;
        Ok(())
    }

    /// Deletes a WAL row.
    pub fn wal_delete(&self, id: i64) -> StoreResult<()> {
        self.conn().execute("DELETE FROM sync_wal WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Returns a WAL row by id.
    pub fn wal_entry(&self, id: i64) -> StoreResult<Option<WalEntry>> {
        let sql = format!("SELECT {WAL_COLUMNS} FROM sync_wal WHERE id = ?1");
        Ok(self.conn().query_row(&sql, [id], wal_from_row).optional()?)
    }

    /// Lists rows left in `pending` or `target_written`, oldest first.
    pub fn wal_incomplete(&self) -> StoreResult<Vec<WalEntry>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {WAL_COLUMNS} FROM sync_wal WHERE state IN ('pending', 'target_written')
             ORDER BY created_at, id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], wal_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Counts rows left in `pending` or `target_written`.
    pub fn wal_pending_count(&self) -> StoreResult<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM sync_wal WHERE state IN ('pending', 'target_written')",
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
