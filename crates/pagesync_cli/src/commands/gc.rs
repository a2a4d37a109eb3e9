//! GC command implementation.

use pagesync_store::Store;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Rows removed by a gc run.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct GcSummary {
    /// Soft-deleted entities purged.
    pub entities: usize,
    /// Unreferenced content blobs purged.
    pub content: usize,
}

/// Purges soft-deleted entities older than `retention`, then orphaned blobs.
pub fn collect(store: &Store, retention: Duration) -> Result<GcSummary, Box<dyn std::error::Error>> {
    let entities = store.gc_deleted(retention)?;
    let content = store.gc_orphaned_content()?;
    Ok(GcSummary { entities, content })
}

/// Runs the gc command.
pub fn run(path: &Path, retention_days: u64) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("Store not found: {}", path.display()).into());
    }
    // Writable open takes the store lock, so this fails while a daemon runs.
    let store = Store::open(path)?;
    let retention = Duration::from_secs(retention_days.saturating_mul(86_400));
    let summary = collect(&store, retention)?;
    info!(
        entities = summary.entities,
        content = summary.content,
        retention_days,
        "store garbage collected"
    );

    println!("Garbage collection complete");
    println!("  Entities purged: {}", summary.entities);
    println!("  Content purged:  {}", summary.content);
    Ok(())
}
