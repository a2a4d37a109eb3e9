//! Error types for the sync engine.

use pagesync_store::StoreError;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// How the resilient client treats a raw remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemoteErrorKind {
    /// Network failure or 5xx. Counts against the circuit breaker.
    Transient,
    /// HTTP 429. Backed off, never counted against the breaker.
    RateLimited,
    /// Any other 4xx. Surfaced immediately.
    Permanent,
}

/// A raw failure reported by a [`RemoteWorkspace`](crate::RemoteWorkspace).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("remote failure ({}): {message}", .status.map_or_else(|| "network".to_string(), |s| s.to_string()))]
pub struct RemoteError {
    /// HTTP status, or `None` when the request never got a response.
    pub status: Option<u16>,
    /// Raw message from the remote or the transport.
    pub message: String,
    /// Server-provided `Retry-After` hint.
    pub retry_after: Option<Duration>,
}

impl RemoteError {
    /// Creates an error for an HTTP status.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            retry_after: None,
        }
    }

    /// Creates a network-level error with no status.
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Creates a 429 with an optional `Retry-After` hint.
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self {
            status: Some(429),
            message: "rate limited".to_string(),
            retry_after,
        }
    }

    /// Classifies the failure.
    pub fn kind(&self) -> RemoteErrorKind {
        match self.status {
            None => RemoteErrorKind::Transient,
            Some(429) => RemoteErrorKind::RateLimited,
            Some(s) if s >= 500 => RemoteErrorKind::Transient,
            Some(_) => RemoteErrorKind::Permanent,
        }
    }
}

/// A remote failure translated into user-facing terms.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{message} ({remediation})")]
pub struct ApiError {
    /// HTTP status; 500 when the request never got a response.
    pub status: u16,
    /// Classification of the raw failure.
    pub kind: RemoteErrorKind,
    /// What went wrong.
    pub message: String,
    /// What the user can do about it.
    pub remediation: String,
    /// The raw remote message.
    pub raw: String,
}

impl ApiError {
    /// Returns true for 404.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Translated remote failure.
    #[error("remote API error: {0}")]
    Api(#[from] ApiError),

    /// The circuit breaker rejected the call without contacting the remote.
    #[error("circuit open, retry in {}s", .retry_in.as_secs())]
    CircuitOpen {
        /// Time until the breaker admits a trial request.
        retry_in: Duration,
    },

    /// Local store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Local filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File watcher failure.
    #[error("watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// A resolved path escapes its project directory.
    #[error("path {path} is outside project directory {root}")]
    PathOutsideProject {
        /// Offending path.
        path: PathBuf,
        /// Directory the path must stay inside.
        root: PathBuf,
    },

    /// No live entity is registered under this key.
    #[error("no tracked entity for {0}")]
    UnknownEntity(String),

    /// Malformed payload from the remote.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The engine was started twice.
    #[error("engine already running")]
    AlreadyRunning,
}

impl SyncError {
    /// Returns true when the remote reported the page gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::Api(api) if api.is_not_found())
    }

    /// Returns true for failures that may succeed on a later cycle.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Api(api) => matches!(
                api.kind,
                RemoteErrorKind::Transient | RemoteErrorKind::RateLimited
            ) || api.status == 409,
            SyncError::CircuitOpen { .. } => true,
            SyncError::Io(_) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Protocol(err.to_string())
    }
}
