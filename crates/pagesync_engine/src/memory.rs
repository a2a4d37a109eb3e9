//! In-memory remote workspace for tests and dry runs.

use crate::error::RemoteError;
use crate::remote::{
    BlockPage, DatabasePage, PageMetadata, RemoteResult, RemoteUser, RemoteWorkspace,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use pagesync_protocol::{blocks_to_markdown, markdown_to_blocks, Block};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

const DATABASE_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
struct MemoryPage {
    blocks: Vec<Block>,
    last_edited_time: DateTime<Utc>,
    archived: bool,
    title: String,
    annotations: Vec<String>,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    method: Option<&'static str>,
    error: RemoteError,
}

#[derive(Debug, Default)]
struct MemoryState {
    pages: HashMap<String, MemoryPage>,
    databases: HashMap<String, Vec<String>>,
    failures: VecDeque<InjectedFailure>,
    calls: HashMap<&'static str, usize>,
    clock: Option<DateTime<Utc>>,
    database_page_size: Option<usize>,
}

impl MemoryState {
    /// Returns a strictly increasing edit time in whole milliseconds, the
    /// resolution of a version token.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let now = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
        let next = match self.clock {
            Some(prev) if prev.timestamp_millis() >= now.timestamp_millis() => {
                prev + ChronoDuration::milliseconds(1)
            }
            _ => now,
        };
        self.clock = Some(next);
        next
    }

    fn enter(&mut self, method: &'static str) -> RemoteResult<()> {
        *self.calls.entry(method).or_default() += 1;
        let position = self
            .failures
            .iter()
            .position(|f| f.method.map_or(true, |m| m == method));
        match position.and_then(|i| self.failures.remove(i)) {
            Some(failure) => Err(failure.error),
            None => Ok(()),
        }
    }

    fn page_mut(&mut self, page_id: &str) -> RemoteResult<&mut MemoryPage> {
        match self.pages.get_mut(page_id) {
            Some(page) if !page.archived => Ok(page),
            _ => Err(RemoteError::status(404, format!("page {page_id} not found"))),
        }
    }
}

/// A remote workspace held entirely in memory.
///
/// Block ids are random UUIDs. Failures can be queued with
/// [`fail_next`](Self::fail_next) and [`fail_method`](Self::fail_method).
#[derive(Debug, Default)]
pub struct MemoryWorkspace {
    state: Mutex<MemoryState>,
}

impl MemoryWorkspace {
    /// Creates an empty workspace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a page with the given markdown body.
    pub fn insert_page(&self, page_id: impl Into<String>, markdown: &str) {
        let mut state = self.state.lock();
        let edited = state.tick();
        state.pages.insert(
            page_id.into(),
            MemoryPage {
                blocks: with_ids(markdown_to_blocks(markdown)),
                last_edited_time: edited,
                archived: false,
                title: "Untitled".to_string(),
                annotations: Vec::new(),
            },
        );
    }

    /// Replaces a page body as a remote user edit would.
    pub fn set_page_markdown(&self, page_id: &str, markdown: &str) {
        let mut state = self.state.lock();
        let edited = state.tick();
        if let Some(page) = state.pages.get_mut(page_id) {
            page.blocks = with_ids(markdown_to_blocks(markdown));
            page.last_edited_time = edited;
        }
    }

    /// Replaces a page body without moving its edit time, as a remote whose
    /// edit times are coarser than its edits reports a second edit within
    /// one tick.
    pub fn edit_in_place(&self, page_id: &str, markdown: &str) {
        if let Some(page) = self.state.lock().pages.get_mut(page_id) {
            page.blocks = with_ids(markdown_to_blocks(markdown));
        }
    }

    /// Sets a page title.
    pub fn set_title(&self, page_id: &str, title: impl Into<String>) {
        if let Some(page) = self.state.lock().pages.get_mut(page_id) {
            page.title = title.into();
        }
    }

    /// Returns the rendered body of a page.
    pub fn page_markdown(&self, page_id: &str) -> Option<String> {
        self.state
            .lock()
            .pages
            .get(page_id)
            .map(|page| blocks_to_markdown(&page.blocks))
    }

    /// Returns the raw blocks of a page.
    pub fn page_blocks(&self, page_id: &str) -> Option<Vec<Block>> {
        self.state
            .lock()
            .pages
            .get(page_id)
            .map(|page| page.blocks.clone())
    }

    /// Archives a page; later reads report 404 and metadata reports archived.
    pub fn archive_page(&self, page_id: &str) {
        let mut state = self.state.lock();
        let edited = state.tick();
        if let Some(page) = state.pages.get_mut(page_id) {
            page.archived = true;
            page.last_edited_time = edited;
        }
    }

    /// Removes a page entirely.
    pub fn remove_page(&self, page_id: &str) {
        self.state.lock().pages.remove(page_id);
    }

    /// Notes left by [`RemoteWorkspace::annotate_removed`].
    pub fn annotations(&self, page_id: &str) -> Vec<String> {
        self.state
            .lock()
            .pages
            .get(page_id)
            .map(|page| page.annotations.clone())
            .unwrap_or_default()
    }

    /// Registers a database whose rows are the given pages.
    pub fn insert_database<I, S>(&self, database_id: impl Into<String>, page_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.lock().databases.insert(
            database_id.into(),
            page_ids.into_iter().map(Into::into).collect(),
        );
    }

    /// Overrides the page size of database queries.
    pub fn set_database_page_size(&self, size: usize) {
        self.state.lock().database_page_size = Some(size.max(1));
    }

    /// Fails the next `count` calls of any method with `error`.
    pub fn fail_next(&self, count: usize, error: RemoteError) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state.failures.push_back(InjectedFailure {
                method: None,
                error: error.clone(),
            });
        }
    }

    /// Fails the next `count` calls of `method` with `error`.
    pub fn fail_method(&self, method: &'static str, count: usize, error: RemoteError) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state.failures.push_back(InjectedFailure {
                method: Some(method),
                error: error.clone(),
            });
        }
    }

    /// Number of calls made to `method`, including failed ones.
    pub fn call_count(&self, method: &str) -> usize {
        self.state.lock().calls.get(method).copied().unwrap_or(0)
    }

    /// Number of calls made to any method.
    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.values().sum()
    }
}

fn with_ids(blocks: Vec<Block>) -> Vec<Block> {
    blocks
        .into_iter()
        .map(|block| Block::with_id(Uuid::new_v4().to_string(), block.content))
        .collect()
}

fn paginate<T: Clone>(items: &[T], cursor: Option<&str>, page_size: usize) -> (Vec<T>, Option<String>) {
    let start = cursor.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
    let end = (start + page_size.max(1)).min(items.len());
    let page = items.get(start..end).map(<[T]>::to_vec).unwrap_or_default();
    let next = (end < items.len()).then(|| end.to_string());
    (page, next)
}

#[async_trait]
impl RemoteWorkspace for MemoryWorkspace {
    async fn current_user(&self) -> RemoteResult<RemoteUser> {
        self.state.lock().enter("current_user")?;
        Ok(RemoteUser {
            id: "memory-user".to_string(),
            name: Some("Memory".to_string()),
        })
    }

    async fn list_blocks(
        &self,
        page_id: &str,
        cursor: Option<&str>,
        page_size: usize,
    ) -> RemoteResult<BlockPage> {
        let mut state = self.state.lock();
        state.enter("list_blocks")?;
        let page = state.page_mut(page_id)?;
        let (results, next_cursor) = paginate(&page.blocks, cursor, page_size);
        Ok(BlockPage {
            results,
            next_cursor,
        })
    }

    async fn delete_block(&self, block_id: &str) -> RemoteResult<()> {
        let mut state = self.state.lock();
        state.enter("delete_block")?;
        let edited = state.tick();
        for page in state.pages.values_mut() {
            let before = page.blocks.len();
            page.blocks.retain(|b| b.id.as_deref() != Some(block_id));
            if page.blocks.len() != before {
                page.last_edited_time = edited;
                return Ok(());
            }
        }
        Err(RemoteError::status(404, format!("block {block_id} not found")))
    }

    async fn append_blocks(&self, page_id: &str, blocks: &[Block]) -> RemoteResult<()> {
        let mut state = self.state.lock();
        state.enter("append_blocks")?;
        let edited = state.tick();
        let page = state.page_mut(page_id)?;
        page.blocks.extend(with_ids(blocks.to_vec()));
        page.last_edited_time = edited;
        Ok(())
    }

    async fn page_metadata(&self, page_id: &str) -> RemoteResult<PageMetadata> {
        let mut state = self.state.lock();
        state.enter("page_metadata")?;
        let page = state
            .pages
            .get(page_id)
            .ok_or_else(|| RemoteError::status(404, format!("page {page_id} not found")))?;
        Ok(PageMetadata {
            id: page_id.to_string(),
            last_edited_time: page.last_edited_time,
            archived: page.archived,
            title: page.title.clone(),
        })
    }

    async fn annotate_removed(&self, page_id: &str, note: &str) -> RemoteResult<()> {
        let mut state = self.state.lock();
        state.enter("annotate_removed")?;
        state.page_mut(page_id)?.annotations.push(note.to_string());
        Ok(())
    }

    async fn query_database(
        &self,
        database_id: &str,
        edited_after: Option<DateTime<Utc>>,
        cursor: Option<&str>,
    ) -> RemoteResult<DatabasePage> {
        let mut state = self.state.lock();
        state.enter("query_database")?;
        let rows = state
            .databases
            .get(database_id)
            .ok_or_else(|| RemoteError::status(404, format!("database {database_id} not found")))?;
        let matching: Vec<PageMetadata> = rows
            .iter()
            .filter_map(|id| state.pages.get(id).map(|page| (id, page)))
            .filter(|(_, page)| edited_after.map_or(true, |after| page.last_edited_time > after))
            .map(|(id, page)| PageMetadata {
                id: id.clone(),
                last_edited_time: page.last_edited_time,
                archived: page.archived,
                title: page.title.clone(),
            })
            .collect();
        let page_size = state.database_page_size.unwrap_or(DATABASE_PAGE_SIZE);
        let (results, next_cursor) = paginate(&matching, cursor, page_size);
        Ok(DatabasePage {
            results,
            next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pages_round_trip_through_blocks() {
        let remote = MemoryWorkspace::new();
        remote.insert_page("p1", "# Title\n\nBody");

        let listed = remote.list_blocks("p1", None, 100).await.unwrap();
        assert_eq!(listed.results.len(), 2);
        assert!(listed.results.iter().all(|b| b.id.is_some()));
        assert_eq!(remote.page_markdown("p1").as_deref(), Some("# Title\n\nBody"));
    }

    #[tokio::test]
    async fn list_blocks_paginates() {
        let remote = MemoryWorkspace::new();
        remote.insert_page("p1", "a\n\nb\n\nc");

        let first = remote.list_blocks("p1", None, 2).await.unwrap();
        assert_eq!(first.results.len(), 2);
        let second = remote
            .list_blocks("p1", first.next_cursor.as_deref(), 2)
            .await
            .unwrap();
        assert_eq!(second.results.len(), 1);
        assert!(second.next_cursor.is_none());
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let remote = MemoryWorkspace::new();
        remote.insert_page("p1", "x");
        remote.fail_method("append_blocks", 1, RemoteError::status(400, "bad"));
        remote.fail_next(1, RemoteError::status(503, "down"));

        let err = remote.page_metadata("p1").await.unwrap_err();
        assert_eq!(err.status, Some(503));
        let err = remote.append_blocks("p1", &[]).await.unwrap_err();
        assert_eq!(err.status, Some(400));
        assert!(remote.page_metadata("p1").await.is_ok());
        assert!(remote.append_blocks("p1", &[]).await.is_ok());
        assert_eq!(remote.call_count("page_metadata"), 2);
    }

    #[tokio::test]
    async fn archived_pages_read_as_missing() {
        let remote = MemoryWorkspace::new();
        remote.insert_page("p1", "x");
        remote.archive_page("p1");

        assert_eq!(
            remote.list_blocks("p1", None, 100).await.unwrap_err().status,
            Some(404)
        );
        assert!(remote.page_metadata("p1").await.unwrap().archived);
    }

    #[tokio::test]
    async fn edits_advance_last_edited_time() {
        let remote = MemoryWorkspace::new();
        remote.insert_page("p1", "x");
        let before = remote.page_metadata("p1").await.unwrap();
        remote.set_page_markdown("p1", "y");
        let after = remote.page_metadata("p1").await.unwrap();
        assert!(after.last_edited_time > before.last_edited_time);
        assert_ne!(after.version(), before.version());
    }

    #[tokio::test]
    async fn rapid_edits_get_distinct_versions() {
        let remote = MemoryWorkspace::new();
        remote.insert_page("p1", "x");
        let mut versions = std::collections::HashSet::new();
        for i in 0..50 {
            remote.set_page_markdown("p1", &format!("edit {i}"));
            let meta = remote.page_metadata("p1").await.unwrap();
            assert_eq!(meta.last_edited_time.timestamp_subsec_nanos() % 1_000_000, 0);
            assert!(versions.insert(meta.version()));
        }
    }

    #[tokio::test]
    async fn in_place_edits_keep_the_version() {
        let remote = MemoryWorkspace::new();
        remote.insert_page("p1", "x");
        let before = remote.page_metadata("p1").await.unwrap();
        remote.edit_in_place("p1", "y");
        let after = remote.page_metadata("p1").await.unwrap();
        assert_eq!(after.version(), before.version());
        assert_eq!(remote.page_markdown("p1").unwrap(), "y");
    }
}
