//! The remote page workspace abstraction.

use crate::error::RemoteError;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use pagesync_protocol::Block;
use serde::{Deserialize, Serialize};

/// Result type for raw remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// The authenticated account behind the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUser {
    /// Account id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
}

/// Page properties relevant to change detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    /// Page id.
    pub id: String,
    /// Last remote edit.
    pub last_edited_time: DateTime<Utc>,
    /// Whether the page was archived or trashed.
    #[serde(default)]
    pub archived: bool,
    /// Page title.
    #[serde(default)]
    pub title: String,
}

impl PageMetadata {
    /// Opaque version token stored on the entity.
    pub fn version(&self) -> String {
        self.last_edited_time
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Last edit as Unix milliseconds.
    pub fn edited_millis(&self) -> i64 {
        self.last_edited_time.timestamp_millis()
    }
}

/// One page of a block listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockPage {
    /// Blocks in document order.
    pub results: Vec<Block>,
    /// Cursor for the next page, if any.
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// One page of a database query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabasePage {
    /// Matching pages.
    pub results: Vec<PageMetadata>,
    /// Cursor for the next page, if any.
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Block-structured page API the engine talks to.
///
/// Implementations report raw failures; retry, backoff and the circuit
/// breaker live in [`ResilientClient`](crate::ResilientClient).
#[async_trait]
pub trait RemoteWorkspace: Send + Sync + 'static {
    /// Returns the account the token belongs to.
    async fn current_user(&self) -> RemoteResult<RemoteUser>;

    /// Lists child blocks of a page.
    async fn list_blocks(
        &self,
        page_id: &str,
        cursor: Option<&str>,
        page_size: usize,
    ) -> RemoteResult<BlockPage>;

    /// Deletes one block.
    async fn delete_block(&self, block_id: &str) -> RemoteResult<()>;

    /// Appends blocks to the end of a page.
    async fn append_blocks(&self, page_id: &str, blocks: &[Block]) -> RemoteResult<()>;

    /// Returns page metadata.
    async fn page_metadata(&self, page_id: &str) -> RemoteResult<PageMetadata>;

    /// Leaves a visible note that the local file was removed.
    async fn annotate_removed(&self, page_id: &str, note: &str) -> RemoteResult<()>;

    /// Lists database pages edited after `edited_after`.
    async fn query_database(
        &self,
        database_id: &str,
        edited_after: Option<DateTime<Utc>>,
        cursor: Option<&str>,
    ) -> RemoteResult<DatabasePage>;
}
