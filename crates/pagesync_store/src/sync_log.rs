//! Append-only sync audit log.

use crate::error::StoreResult;
use crate::store::{now_millis, Store};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Row};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Default page size for [`LogQuery`].
pub const DEFAULT_LOG_LIMIT: usize = 100;

/// Kind of logged event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOperation {
    /// Local content pushed.
    Push,
    /// Remote content pulled.
    Pull,
    /// Both sides merged.
    Merge,
    /// A conflict was recorded.
    Conflict,
    /// An entity was soft-deleted.
    Delete,
    /// An operation failed.
    Error,
}

impl LogOperation {
    /// Returns the stored name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogOperation::Push => "push",
            LogOperation::Pull => "pull",
            LogOperation::Merge => "merge",
            LogOperation::Conflict => "conflict",
            LogOperation::Delete => "delete",
            LogOperation::Error => "error",
        }
    }
}

impl fmt::Display for LogOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(LogOperation::Push),
            "pull" => Ok(LogOperation::Pull),
            "merge" => Ok(LogOperation::Merge),
            "conflict" => Ok(LogOperation::Conflict),
            "delete" => Ok(LogOperation::Delete),
            "error" => Ok(LogOperation::Error),
            other => Err(format!("unknown log operation: {other}")),
        }
    }
}

/// Direction of data flow for a logged event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Local file to remote page.
    LocalToRemote,
    /// Remote page to local file.
    RemoteToLocal,
}

impl Direction {
    /// Returns the stored name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::LocalToRemote => "local_to_remote",
            Direction::RemoteToLocal => "remote_to_local",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "local_to_remote" => Some(Direction::LocalToRemote),
            "remote_to_local" => Some(Direction::RemoteToLocal),
            _ => None,
        }
    }
}

/// A sync log row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    /// Row id.
    pub id: i64,
    /// Related entity, if any.
    pub entity_id: Option<i64>,
    /// Event kind.
    pub operation: LogOperation,
    /// Data-flow direction, if meaningful.
    pub direction: Option<Direction>,
    /// Free-form JSON detail.
    pub detail: serde_json::Value,
    /// Creation time (Unix ms).
    pub created_at: i64,
}

/// Filter and pagination for sync log queries. Results are newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    /// Only rows for this entity.
    pub entity_id: Option<i64>,
    /// Only rows of this kind.
    pub operation: Option<LogOperation>,
    /// Only rows created at or after this time (Unix ms).
    pub since: Option<i64>,
    /// Only rows created at or before this time (Unix ms).
    pub until: Option<i64>,
    /// Page size.
    pub limit: usize,
    /// Rows to skip.
    pub offset: usize,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            entity_id: None,
            operation: None,
            since: None,
            until: None,
            limit: DEFAULT_LOG_LIMIT,
            offset: 0,
        }
    }
}

impl LogQuery {
    /// Restricts to one entity.
    pub fn with_entity(mut self, entity_id: i64) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    /// Restricts to one operation kind.
    pub fn with_operation(mut self, operation: LogOperation) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Restricts to rows created at or after `since`.
    pub fn with_since(mut self, since: i64) -> Self {
        self.since = Some(since);
        self
    }

    /// Restricts to rows created at or before `until`.
    pub fn with_until(mut self, until: i64) -> Self {
        self.until = Some(until);
        self
    }

    /// Sets the page size.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the number of rows to skip.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<LogEntry> {
    let op: String = row.get(2)?;
    let direction: Option<String> = row.get(3)?;
    let detail: String = row.get(4)?;
    Ok(LogEntry {
        id: row.get(0)?,
        entity_id: row.get(1)?,
        operation: op
            .parse()
            .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?,
        direction: direction.as_deref().and_then(Direction::parse),
        detail: serde_json::from_str(&detail)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
        created_at: row.get(5)?,
    })
}

fn to_sql_int(n: usize) -> Value {
    Value::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

impl Store {
    /// Appends a log row and returns its id.
    pub fn append_log(
        &self,
        entity_id: Option<i64>,
        operation: LogOperation,
        direction: Option<Direction>,
        detail: &serde_json::Value,
    ) -> StoreResult<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO sync_log (entity_id, operation, direction, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entity_id,
                operation.as_str(),
                direction.map(|d| d.as_str()),
                serde_json::to_string(detail)?,
                now_millis()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Queries the log, newest first.
    pub fn query_log(&self, query: &LogQuery) -> StoreResult<Vec<LogEntry>> {
        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(entity_id) = query.entity_id {
            values.push(Value::Integer(entity_id));
            clauses.push(format!("entity_id = ?{}", values.len()));
        }
        if let Some(operation) = query.operation {
            values.push(Value::Text(operation.as_str().to_string()));
            clauses.push(format!("operation = ?{}", values.len()));
        }
        if let Some(since) = query.since {
            values.push(Value::Integer(since));
            clauses.push(format!("created_at >= ?{}", values.len()));
        }
        if let Some(until) = query.until {
            values.push(Value::Integer(until));
            clauses.push(format!("created_at <= ?{}", values.len()));
        }

        let filter = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        values.push(to_sql_int(query.limit));
        values.push(to_sql_int(query.offset));
        let sql = format!(
            "SELECT id, entity_id, operation, direction, detail, created_at FROM sync_log
             {filter} ORDER BY created_at DESC, id DESC LIMIT ?{} OFFSET ?{}",
            values.len() - 1,
            values.len()
        );

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), log_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
