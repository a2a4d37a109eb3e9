//! Remote change detection.

use crate::client::ResilientClient;
use crate::error::{SyncError, SyncResult};
use crate::queue::SyncQueue;
use crate::remote::RemoteWorkspace;
use chrono::{DateTime, Utc};
use pagesync_protocol::{OperationKind, SyncOperation};
use pagesync_store::{now_millis, Entity, Store};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Pagination cap for one database poll.
pub const MAX_DATABASE_PAGES: usize = 20;

/// A database row edited since the last poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageChange {
    /// Page id.
    pub page_id: String,
    /// Last remote edit.
    pub last_edited: DateTime<Utc>,
    /// Page title, `"Untitled"` when blank.
    pub title: String,
}

/// Outcome of one entity poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollReport {
    /// Entities checked.
    pub checked: usize,
    /// Operations enqueued.
    pub enqueued: usize,
    /// Entities whose check failed.
    pub failed: usize,
}

/// Polls tracked pages for remote edits. At most one cycle runs at a time.
#[derive(Debug, Default)]
pub struct Poller {
    in_flight: AtomicBool,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Entities whose page content is mirrored to a file.
fn is_page_backed(entity: &Entity) -> bool {
    !entity.entity_type.is_container()
}

impl Poller {
    /// Creates an idle poller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while a cycle is running.
    pub fn is_polling(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Checks every live page-backed entity once.
    ///
    /// Returns `None` when another cycle is already running. A page that
    /// is gone or archived enqueues a deletion; a page whose version moved
    /// and whose last edit is newer than the last sync enqueues an update.
    /// An open circuit ends the cycle early.
    pub async fn poll_entities<R: RemoteWorkspace>(
        &self,
        store: &Store,
        client: &ResilientClient<R>,
        queue: &SyncQueue,
    ) -> SyncResult<Option<PollReport>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("poll already in progress, skipping");
            return Ok(None);
        }
        let _guard = InFlight(&self.in_flight);

        let entities = store.list_entities(None)?;
        let mut report = PollReport::default();
        for entity in entities.iter().filter(|e| is_page_backed(e)) {
            report.checked += 1;
            let kind = match client.page_metadata(&entity.remote_id).await {
                Ok(meta) if meta.archived => Some(OperationKind::PageDeleted),
                Ok(meta) => {
                    let version = meta.version();
                    let moved = entity.last_remote_version.as_deref() != Some(version.as_str());
                    let newer = meta.edited_millis() > entity.last_sync_at.unwrap_or(0);
                    (moved && newer).then_some(OperationKind::PageUpdated)
                }
                Err(e) if e.is_not_found() => Some(OperationKind::PageDeleted),
                Err(e @ SyncError::CircuitOpen { .. }) => {
                    warn!(error = %e, "circuit open, ending poll early");
                    report.failed += 1;
                    break;
                }
                Err(e) => {
                    warn!(remote_id = %entity.remote_id, error = %e, "poll failed for entity");
                    report.failed += 1;
                    None
                }
            };
            if let Some(kind) = kind {
                debug!(remote_id = %entity.remote_id, kind = %kind, "remote change detected");
                if queue.enqueue(SyncOperation::new(kind, entity.remote_id.clone(), now_millis())) {
                    report.enqueued += 1;
                }
            }
        }
        if report.enqueued > 0 {
            info!(
                checked = report.checked,
                enqueued = report.enqueued,
                "poll found remote changes"
            );
        }
        Ok(Some(report))
    }

    /// Lists rows of a database edited after `since`, up to
    /// [`MAX_DATABASE_PAGES`] result pages.
    pub async fn poll_database<R: RemoteWorkspace>(
        &self,
        client: &ResilientClient<R>,
        database_id: &str,
        since: DateTime<Utc>,
    ) -> SyncResult<Vec<PageChange>> {
        let mut changes = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_DATABASE_PAGES {
            let page = client
                .query_database(database_id, Some(since), cursor.as_deref())
                .await?;
            changes.extend(page.results.into_iter().map(|meta| PageChange {
                page_id: meta.id,
                last_edited: meta.last_edited_time,
                title: if meta.title.trim().is_empty() {
                    "Untitled".to_string()
                } else {
                    meta.title
                },
            }));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(changes),
            }
        }
        warn!(database_id, "database poll hit the page cap");
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::memory::MemoryWorkspace;
    use crate::error::RemoteError;
    use pagesync_store::{EntityType, NewEntity, SyncUpdate};
    use std::sync::Arc;

    struct Fixture {
        remote: Arc<MemoryWorkspace>,
        client: ResilientClient<MemoryWorkspace>,
        store: Store,
        queue: SyncQueue,
    }

    fn fixture() -> Fixture {
        let remote = Arc::new(MemoryWorkspace::new());
        Fixture {
            client: ResilientClient::new(remote.clone(), ClientConfig::default()),
            remote,
            store: Store::in_memory().unwrap(),
            queue: SyncQueue::new(100),
        }
    }

    async fn synced(fx: &Fixture, path: &str, page: &str) -> Entity {
        fx.remote.insert_page(page, "body");
        let entity = fx
            .store
            .upsert_entity(&NewEntity::new(path, page, EntityType::Doc))
            .unwrap();
        let meta = fx.client.page_metadata(page).await.unwrap();
        let base = fx.store.upsert_content("body").unwrap();
        fx.store
            .record_sync(
                entity.id,
                &SyncUpdate {
                    local_hash: "h".into(),
                    remote_hash: "h".into(),
                    remote_version: Some(meta.version()),
                    base_content_id: base,
                    synced_at: now_millis().max(meta.edited_millis()),
                },
            )
            .unwrap();
        entity
    }

    #[tokio::test]
    async fn unchanged_pages_enqueue_nothing() {
        let fx = fixture();
        synced(&fx, "/p/a.md", "page-a").await;

        let report = Poller::new()
            .poll_entities(&fx.store, &fx.client, &fx.queue)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.enqueued, 0);
        assert!(fx.queue.is_empty());
    }

    #[tokio::test]
    async fn containers_are_not_polled() {
        let fx = fixture();
        fx.remote.insert_page("page-proj", "root");
        fx.store
            .upsert_entity(&NewEntity::new("/p", "page-proj", EntityType::Project))
            .unwrap();
        fx.remote.set_page_markdown("page-proj", "edited");

        let report = Poller::new()
            .poll_entities(&fx.store, &fx.client, &fx.queue)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.checked, 0);
        assert!(fx.queue.is_empty());
        assert_eq!(fx.remote.call_count("page_metadata"), 0);
    }

    #[tokio::test]
    async fn remote_edit_enqueues_update() {
        let fx = fixture();
        synced(&fx, "/p/a.md", "page-a").await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        fx.remote.set_page_markdown("page-a", "edited");

        Poller::new()
            .poll_entities(&fx.store, &fx.client, &fx.queue)
            .await
            .unwrap();
        let ops = fx.queue.drain();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OperationKind::PageUpdated);
        assert_eq!(ops[0].entity_key, "page-a");
    }

    #[tokio::test]
    async fn archived_and_missing_pages_enqueue_deletion() {
        let fx = fixture();
        synced(&fx, "/p/a.md", "page-a").await;
        synced(&fx, "/p/b.md", "page-b").await;
        fx.remote.archive_page("page-a");
        fx.remote.remove_page("page-b");

        Poller::new()
            .poll_entities(&fx.store, &fx.client, &fx.queue)
            .await
            .unwrap();
        let ops = fx.queue.drain();
        assert_eq!(ops.len(), 2);
        assert!(ops.iter().all(|op| op.kind == OperationKind::PageDeleted));
    }

    #[tokio::test]
    async fn failures_are_counted_and_skipped() {
        let fx = fixture();
        synced(&fx, "/p/a.md", "page-a").await;
        fx.remote
            .fail_method("page_metadata", 1, RemoteError::status(403, "no access"));

        let report = Poller::new()
            .poll_entities(&fx.store, &fx.client, &fx.queue)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.failed, 1);
        assert!(fx.queue.is_empty());
    }

    #[tokio::test]
    async fn concurrent_poll_is_skipped() {
        let fx = fixture();
        let poller = Poller::new();
        poller.in_flight.store(true, Ordering::Release);
        assert!(poller
            .poll_entities(&fx.store, &fx.client, &fx.queue)
            .await
            .unwrap()
            .is_none());
        assert!(poller.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn database_poll_is_capped() {
        let fx = fixture();
        let ids: Vec<String> = (0..30).map(|i| format!("row-{i}")).collect();
        for id in &ids {
            fx.remote.insert_page(id.clone(), "x");
        }
        fx.remote.set_title("row-0", "First row");
        fx.remote.insert_database("db", ids);
        fx.remote.set_database_page_size(1);

        let since = DateTime::<Utc>::MIN_UTC;
        let changes = Poller::new()
            .poll_database(&fx.client, "db", since)
            .await
            .unwrap();
        assert_eq!(changes.len(), MAX_DATABASE_PAGES);
        assert_eq!(fx.remote.call_count("query_database"), MAX_DATABASE_PAGES);
        assert_eq!(changes[0].title, "First row");
        assert_eq!(changes[1].title, "Untitled");
    }
}
