//! Conflicts command implementation.

use super::{format_millis, open_existing};
use chrono::Utc;
use pagesync_protocol::format_conflict_file;
use pagesync_store::{ConflictRecord, Store};
use serde::Serialize;
use std::path::Path;

/// One conflicted entity.
#[derive(Debug, Serialize)]
pub struct ConflictSummary {
    /// Entity id.
    pub entity_id: i64,
    /// Local file path.
    pub path: String,
    /// Remote page id.
    pub remote_id: String,
    /// Detection time (Unix ms).
    pub detected_at: Option<i64>,
    /// Local variant, included with `--show`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<String>,
    /// Remote variant, included with `--show`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
}

impl ConflictSummary {
    fn from_record(record: ConflictRecord, show: bool) -> Self {
        Self {
            entity_id: record.entity.id,
            detected_at: record.entity.conflict.map(|c| c.detected_at),
            path: record.entity.local_path,
            remote_id: record.entity.remote_id,
            local: show.then_some(record.local_content),
            remote: show.then_some(record.remote_content),
        }
    }
}

/// Lists conflicted entities.
pub fn collect(store: &Store, show: bool) -> Result<Vec<ConflictSummary>, Box<dyn std::error::Error>> {
    Ok(store
        .list_conflicts()?
        .into_iter()
        .map(|record| ConflictSummary::from_record(record, show))
        .collect())
}

/// Runs the conflicts command.
pub fn run(path: &Path, show: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(path)?;
    let conflicts = collect(&store, show)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&conflicts)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No conflicts");
        return Ok(());
    }
    println!("{} conflicted entit{}", conflicts.len(), if conflicts.len() == 1 { "y" } else { "ies" });
    for conflict in &conflicts {
        println!();
        println!(
            "[{}] {} ({}) detected {}",
            conflict.entity_id,
            conflict.path,
            conflict.remote_id,
            conflict
                .detected_at
                .map_or_else(|| "unknown".to_string(), format_millis)
        );
        if let (Some(local), Some(remote)) = (&conflict.local, &conflict.remote) {
            println!();
            println!("{}", format_conflict_file(&conflict.path, local, remote, Utc::now()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagesync_store::{EntityType, NewEntity};

    fn conflicted_store() -> Store {
        let store = Store::in_memory().unwrap();
        let doc = store
            .upsert_entity(&NewEntity::new("/p/a.md", "page-a", EntityType::Doc))
            .unwrap();
        store
            .upsert_entity(&NewEntity::new("/p/b.md", "page-b", EntityType::Doc))
            .unwrap();
        let local = store.upsert_content("mine").unwrap();
        let remote = store.upsert_content("theirs").unwrap();
        store.mark_conflict(doc.id, local, remote).unwrap();
        store
    }

    #[test]
    fn lists_only_conflicted_entities() {
        let store = conflicted_store();
        let conflicts = collect(&store, false).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].path, "/p/a.md");
        assert!(conflicts[0].detected_at.is_some());
        assert!(conflicts[0].local.is_none());
    }

    #[test]
    fn show_includes_both_variants() {
        let store = conflicted_store();
        let conflicts = collect(&store, true).unwrap();
        assert_eq!(conflicts[0].local.as_deref(), Some("mine"));
        assert_eq!(conflicts[0].remote.as_deref(), Some("theirs"));
    }
}
