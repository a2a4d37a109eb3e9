//! Log command implementation.

use super::{format_millis, open_existing};
use pagesync_store::{now_millis, LogEntry, LogOperation, LogQuery, Store};
use std::path::Path;

/// Filters taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    /// Entity id.
    pub entity: Option<i64>,
    /// Operation name.
    pub operation: Option<String>,
    /// Look-back window in hours.
    pub since_hours: Option<u64>,
    /// Page size.
    pub limit: usize,
    /// Rows to skip.
    pub offset: usize,
}

impl LogFilter {
    /// Converts the filter into a store query.
    pub fn to_query(&self, now: i64) -> Result<LogQuery, Box<dyn std::error::Error>> {
        let mut query = LogQuery::default()
            .with_limit(self.limit)
            .with_offset(self.offset);
        if let Some(entity) = self.entity {
            query = query.with_entity(entity);
        }
        if let Some(operation) = &self.operation {
            query = query.with_operation(operation.parse::<LogOperation>()?);
        }
        if let Some(hours) = self.since_hours {
            let window = i64::try_from(hours.saturating_mul(3_600_000)).unwrap_or(i64::MAX);
            query = query.with_since(now.saturating_sub(window));
        }
        Ok(query)
    }
}

/// Reads log entries matching the filter.
pub fn collect(store: &Store, filter: &LogFilter) -> Result<Vec<LogEntry>, Box<dyn std::error::Error>> {
    Ok(store.query_log(&filter.to_query(now_millis())?)?)
}

/// Runs the log command.
pub fn run(path: &Path, filter: &LogFilter, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(path)?;
    let entries = collect(&store, filter)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&entries)?),
        _ => {
            if entries.is_empty() {
                println!("No log entries");
            }
            for entry in &entries {
                println!(
                    "{}  {:<8}  {:<15}  {:<6}  {}",
                    format_millis(entry.created_at),
                    entry.operation.as_str(),
                    entry.direction.map_or("-", |d| d.as_str()),
                    entry
                        .entity_id
                        .map_or_else(|| "-".to_string(), |id| id.to_string()),
                    entry.detail
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_builds_query() {
        let filter = LogFilter {
            entity: Some(7),
            operation: Some("error".into()),
            since_hours: Some(2),
            limit: 10,
            offset: 5,
        };
        let query = filter.to_query(10_000_000).unwrap();
        assert_eq!(query.entity_id, Some(7));
        assert_eq!(query.operation, Some(LogOperation::Error));
        assert_eq!(query.since, Some(10_000_000 - 7_200_000));
        assert_eq!(query.limit, 10);
        assert_eq!(query.offset, 5);
    }

    #[test]
    fn unknown_operation_is_rejected() {
        let filter = LogFilter {
            operation: Some("explode".into()),
            limit: 10,
            ..LogFilter::default()
        };
        assert!(filter.to_query(0).is_err());
    }

    #[test]
    fn reads_entries_newest_first() {
        let store = Store::in_memory().unwrap();
        store
            .append_log(None, LogOperation::Push, None, &json!({"n": 1}))
            .unwrap();
        store
            .append_log(None, LogOperation::Error, None, &json!({"n": 2}))
            .unwrap();

        let all = collect(
            &store,
            &LogFilter {
                limit: 10,
                ..LogFilter::default()
            },
        )
        .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].detail["n"], 2);

        let errors = collect(
            &store,
            &LogFilter {
                operation: Some("error".into()),
                limit: 10,
                ..LogFilter::default()
            },
        )
        .unwrap();
        assert_eq!(errors.len(), 1);
    }
}
