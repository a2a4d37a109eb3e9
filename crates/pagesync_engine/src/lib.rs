//! # PageSync Engine
//!
//! Bidirectional sync between a directory of markdown files and a remote
//! block-based page workspace.
//!
//! This crate provides:
//! - The sync engine (watch, queue, drain, poll)
//! - Push, pull and three-way merge with WAL protection
//! - A resilient remote client (rate limiting, 429 backoff, circuit breaker,
//!   per-page write locks, error translation)
//! - A debounced, filtered file watcher
//! - Remote polling for pages and databases
//! - An HTTP remote and an in-memory remote for tests
//!
//! ## Architecture
//!
//! Local edits and remote edits both become [`SyncOperation`]s in one
//! deduplicating queue, keyed by side and entity. A single drain task
//! processes the queue:
//! 1. Local changes push, or merge if the page also moved
//! 2. Remote changes pull, or merge if the file also changed
//! 3. Removals on either side soft-delete the entity
//!
//! ## Key Invariants
//!
//! - Every content write is preceded by a WAL row and committed with the
//!   entity update in one transaction
//! - Unchanged content (by normalized hash) never produces a remote write
//! - Local frontmatter never reaches the remote and survives every pull
//! - Files are only written inside their project directory
//!
//! [`SyncOperation`]: pagesync_protocol::SyncOperation

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod engine;
mod error;
mod http;
mod memory;
mod poller;
mod queue;
mod remote;
mod status;
mod watcher;

pub use client::{translate, CircuitState, PageGuard, PageLocks, ResilientClient, BLOCK_PAGE_SIZE};
pub use config::{ClientConfig, SyncConfig, DEFAULT_IGNORE_PATTERNS};
pub use engine::{contained_path, EntityKey, SyncEngine};
pub use error::{ApiError, RemoteError, RemoteErrorKind, SyncError, SyncResult};
pub use http::{
    HttpClient, HttpRequest, HttpResponse, HttpWorkspace, LoopbackClient, Method, ReqwestClient,
};
pub use memory::MemoryWorkspace;
pub use poller::{PageChange, PollReport, Poller, MAX_DATABASE_PAGES};
pub use queue::SyncQueue;
pub use remote::{BlockPage, DatabasePage, PageMetadata, RemoteResult, RemoteUser, RemoteWorkspace};
pub use status::{DrainReport, EngineStatus, GcReport, HealthReport};
pub use watcher::{FileEvent, FileEventKind, FileWatcher, WatchFilter};
