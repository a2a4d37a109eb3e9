//! WAL command implementation.

use super::{format_millis, open_existing};
use pagesync_store::{Store, WalEntry};
use std::path::Path;

/// Reads incomplete WAL rows, oldest first.
pub fn collect(store: &Store) -> Result<Vec<WalEntry>, Box<dyn std::error::Error>> {
    Ok(store.wal_incomplete()?)
}

/// Runs the wal command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(path)?;
    let entries = collect(&store)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&entries)?),
        _ => {
            if entries.is_empty() {
                println!("No incomplete WAL entries");
                return Ok(());
            }
            println!("{} incomplete WAL entries", entries.len());
            println!();
            for entry in &entries {
                println!(
                    "#{:<6} entity {:<6} {:<6} {:<15} started {}",
                    entry.id,
                    entry.entity_id,
                    entry.operation.as_str(),
                    entry.state.as_str(),
                    format_millis(entry.created_at)
                );
            }
            println!();
            println!("These operations were interrupted. The next successful sync");
            println!("of each entity supersedes its rows.");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagesync_store::{EntityType, NewEntity, WalOperation, WalState};

    #[test]
    fn lists_only_incomplete_rows() {
        let store = Store::in_memory().unwrap();
        let doc = store
            .upsert_entity(&NewEntity::new("/p/a.md", "page-a", EntityType::Doc))
            .unwrap();
        let done = store.wal_begin(doc.id, WalOperation::Push, None, "a").unwrap();
        store.wal_mark_target_written(done).unwrap();
        store.wal_mark_committed(done).unwrap();
        let stuck = store.wal_begin(doc.id, WalOperation::Pull, None, "b").unwrap();
        store.wal_mark_target_written(stuck).unwrap();

        let entries = collect(&store).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, stuck);
        assert_eq!(entries[0].state, WalState::TargetWritten);
    }
}
