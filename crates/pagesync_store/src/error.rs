//! Error types for the store.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or writing the store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A JSON column could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error on the database or lock file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Another process holds the store lock.
    #[error("store is locked by another process: {}", .0.display())]
    Locked(PathBuf),

    /// A referenced row does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Row kind.
        kind: &'static str,
        /// Row id.
        id: i64,
    },

    /// A uniqueness rule rejected the write.
    #[error("duplicate {0}")]
    Duplicate(String),

    /// A WAL row was asked to move to a state it cannot reach.
    #[error("WAL entry {id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// WAL row id.
        id: i64,
        /// Current state.
        from: String,
        /// Requested state.
        to: String,
    },
}

impl StoreError {
    /// Creates a not-found error for an entity.
    pub fn entity_not_found(id: i64) -> Self {
        Self::NotFound { kind: "entity", id }
    }

    /// Returns true if the error came from a uniqueness or foreign-key rule.
    pub fn is_constraint(&self) -> bool {
        match self {
            StoreError::Duplicate(_) => true,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(StoreError::entity_not_found(7).to_string(), "entity 7 not found");
        let err = StoreError::Locked(PathBuf::from("/tmp/sync.db"));
        assert!(err.to_string().contains("/tmp/sync.db"));
        assert!(StoreError::Duplicate("remote id".into()).is_constraint());
    }
}
