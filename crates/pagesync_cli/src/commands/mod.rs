//! CLI command implementations.

pub mod conflicts;
pub mod gc;
pub mod log;
pub mod status;
pub mod wal;

use chrono::{DateTime, SecondsFormat, Utc};
use pagesync_store::Store;
use std::path::Path;

/// Opens an existing store for inspection.
pub fn open_existing(path: &Path) -> Result<Store, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No sync store found at {:?}", path).into());
    }
    Ok(Store::open_read_only(path)?)
}

/// Formats Unix milliseconds as RFC 3339.
pub fn format_millis(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| ms.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_millis() {
        assert_eq!(format_millis(0), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn missing_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open_existing(&dir.path().join("nope.db")).is_err());
    }
}
