//! Per-project snapshots kept for the issue-sync collaborator.

use crate::error::StoreResult;
use crate::store::{now_millis, Store};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

/// Stored snapshot for one project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueSnapshot {
    /// Project key.
    pub project_key: String,
    /// Opaque snapshot document.
    pub snapshot: serde_json::Value,
    /// Last update (Unix ms).
    pub updated_at: i64,
}

impl Store {
    /// Returns the snapshot for `project_key`, if any.
    pub fn issue_snapshot(&self, project_key: &str) -> StoreResult<Option<IssueSnapshot>> {
        let row: Option<(String, i64)> = self
            .conn()
            .query_row(
                "SELECT snapshot_json, updated_at FROM issue_snapshots WHERE project_key = ?1",
                [project_key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        row.map(|(json, updated_at)| -> StoreResult<IssueSnapshot> {
            Ok(IssueSnapshot {
                project_key: project_key.to_string(),
                snapshot: serde_json::from_str(&json)?,
                updated_at,
            })
        })
        .transpose()
    }

    /// Replaces the snapshot for `project_key`.
    pub fn put_issue_snapshot(
        &self,
        project_key: &str,
        snapshot: &serde_json::Value,
    ) -> StoreResult<()> {
        self.conn().execute(
            "INSERT INTO issue_snapshots (project_key, snapshot_json, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(project_key) DO UPDATE SET
                snapshot_json = excluded.snapshot_json,
                updated_at = excluded.updated_at",
            params![project_key, serde_json::to_string(snapshot)?, now_millis()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_replaces_previous_snapshot() {
        let store = Store::in_memory().unwrap();
        assert!(store.issue_snapshot("proj").unwrap().is_none());

        store.put_issue_snapshot("proj", &json!({"open": 1})).unwrap();
        store.put_issue_snapshot("proj", &json!({"open": 2})).unwrap();

        let snap = store.issue_snapshot("proj").unwrap().unwrap();
        assert_eq!(snap.snapshot, json!({"open": 2}));
        assert_eq!(snap.project_key, "proj");
    }
}
