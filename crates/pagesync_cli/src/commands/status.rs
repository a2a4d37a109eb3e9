//! Status command implementation.

use super::{format_millis, open_existing};
use pagesync_store::Store;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Store status summary.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Store path.
    pub path: String,
    /// Result of the integrity check.
    pub store_ok: bool,
    /// Live entities per type.
    pub entities: BTreeMap<String, usize>,
    /// Total live entities.
    pub total_entities: usize,
    /// Entities carrying a conflict marker.
    pub conflicts: usize,
    /// Incomplete WAL rows.
    pub pending_wal: usize,
    /// Most recent successful sync (Unix ms).
    pub last_sync_at: Option<i64>,
}

/// Builds the status report.
pub fn collect(store: &Store, path: &Path) -> Result<StatusReport, Box<dyn std::error::Error>> {
    let entities = store.list_entities(None)?;
    let mut by_type = BTreeMap::new();
    for entity in &entities {
        *by_type.entry(entity.entity_type.to_string()).or_insert(0) += 1;
    }
    Ok(StatusReport {
        path: path.display().to_string(),
        store_ok: store.quick_check()?,
        total_entities: entities.len(),
        conflicts: entities.iter().filter(|e| e.conflict.is_some()).count(),
        last_sync_at: entities.iter().filter_map(|e| e.last_sync_at).max(),
        entities: by_type,
        pending_wal: store.wal_pending_count()?,
    })
}

/// Runs the status command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(path)?;
    let report = collect(&store, path)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text_output(&report),
    }
    Ok(())
}

fn print_text_output(report: &StatusReport) {
    println!("PageSync Store: {}", report.path);
    println!("================");
    println!();
    println!(
        "Integrity:      {}",
        if report.store_ok { "ok" } else { "FAILED" }
    );
    println!("Entities:       {}", report.total_entities);
    for (kind, count) in &report.entities {
        println!("  {:<12}  {}", kind, count);
    }
    println!("Conflicts:      {}", report.conflicts);
    println!("Pending WAL:    {}", report.pending_wal);
    match report.last_sync_at {
        Some(ms) => println!("Last sync:      {}", format_millis(ms)),
        None => println!("Last sync:      never"),
    }
}
