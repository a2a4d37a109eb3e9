//! Error types for protocol operations.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors produced while parsing protocol values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A conflict strategy name was not recognised.
    #[error("unknown conflict strategy: {0}")]
    UnknownStrategy(String),

    /// An operation kind name was not recognised.
    #[error("unknown operation kind: {0}")]
    UnknownOperationKind(String),

    /// A block payload could not be decoded.
    #[error("invalid block: {0}")]
    InvalidBlock(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidBlock(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::UnknownStrategy("theirs".into());
        assert_eq!(err.to_string(), "unknown conflict strategy: theirs");
    }
}
