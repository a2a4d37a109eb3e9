//! Queue operation types.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which side of the sync pair an operation originated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The local filesystem.
    Local,
    /// The remote workspace.
    Remote,
}

impl Side {
    /// Returns the queue-key prefix for this side.
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Local => "local",
            Side::Remote => "remote",
        }
    }
}

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// A watched file appeared.
    FileAdded,
    /// A watched file changed.
    FileModified,
    /// A watched file was removed.
    FileRemoved,
    /// A remote page was edited.
    PageUpdated,
    /// A remote page was created.
    PageCreated,
    /// A remote page was deleted or archived.
    PageDeleted,
}

impl OperationKind {
    /// Returns the side that produces this kind of operation.
    pub fn side(&self) -> Side {
        match self {
            OperationKind::FileAdded | OperationKind::FileModified | OperationKind::FileRemoved => {
                Side::Local
            }
            OperationKind::PageUpdated
            | OperationKind::PageCreated
            | OperationKind::PageDeleted => Side::Remote,
        }
    }

    /// Returns true for removals on either side.
    pub fn is_removal(&self) -> bool {
        matches!(self, OperationKind::FileRemoved | OperationKind::PageDeleted)
    }

    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::FileAdded => "file_added",
            OperationKind::FileModified => "file_modified",
            OperationKind::FileRemoved => "file_removed",
            OperationKind::PageUpdated => "page_updated",
            OperationKind::PageCreated => "page_created",
            OperationKind::PageDeleted => "page_deleted",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file_added" => Ok(OperationKind::FileAdded),
            "file_modified" => Ok(OperationKind::FileModified),
            "file_removed" => Ok(OperationKind::FileRemoved),
            "page_updated" => Ok(OperationKind::PageUpdated),
            "page_created" => Ok(OperationKind::PageCreated),
            "page_deleted" => Ok(OperationKind::PageDeleted),
            other => Err(ProtocolError::UnknownOperationKind(other.to_string())),
        }
    }
}

/// A pending change waiting in the sync queue.
///
/// `entity_key` is the local path for local operations and the remote page id
/// for remote ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOperation {
    /// Originating side.
    pub side: Side,
    /// What happened.
    pub kind: OperationKind,
    /// Local path or remote id.
    pub entity_key: String,
    /// Unix milliseconds when the change was observed.
    pub timestamp: i64,
}

impl SyncOperation {
    /// Creates an operation; the side is derived from the kind.
    pub fn new(kind: OperationKind, entity_key: impl Into<String>, timestamp: i64) -> Self {
        Self {
            side: kind.side(),
            kind,
            entity_key: entity_key.into(),
            timestamp,
        }
    }

    /// Returns the deduplication key, `<side>:<entity_key>`.
    pub fn queue_key(&self) -> String {
        format!("{}:{}", self.side.as_str(), self.entity_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_follows_kind() {
        let op = SyncOperation::new(OperationKind::FileModified, "/p/doc.md", 1);
        assert_eq!(op.side, Side::Local);
        assert_eq!(op.queue_key(), "local:/p/doc.md");

        let op = SyncOperation::new(OperationKind::PageDeleted, "page-1", 2);
        assert_eq!(op.side, Side::Remote);
        assert!(op.kind.is_removal());
        assert_eq!(op.queue_key(), "remote:page-1");
    }

    #[test]
    fn kind_names_parse_back() {
        assert_eq!("page_updated".parse::<OperationKind>(), Ok(OperationKind::PageUpdated));
        assert!("renamed".parse::<OperationKind>().is_err());
        assert_eq!(OperationKind::FileAdded.to_string(), "file_added");
    }
}
