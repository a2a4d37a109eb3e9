//! Local to remote: pushes and local removals.

use super::SyncEngine;
use crate::error::SyncResult;
use crate::remote::{PageMetadata, RemoteWorkspace};
use pagesync_protocol::{
    blocks_to_markdown, content_hash, markdown_to_blocks, normalize, split_frontmatter,
    BlockContent, OperationKind, SyncOperation, MAX_BLOCKS_PER_APPEND,
};
use pagesync_store::{
    now_millis, Direction, Entity, LogOperation, SyncUpdate, WalOperation,
};
use serde_json::json;
use std::path::Path;
use tracing::{debug, info, warn};

/// Entities whose content is not mirrored as page blocks.
pub(super) fn is_container(entity: &Entity) -> bool {
    entity.entity_type.is_container()
}

pub(super) async fn read_local(path: &Path) -> SyncResult<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl<R: RemoteWorkspace> SyncEngine<R> {
    pub(super) async fn process_local(&self, op: &SyncOperation) -> SyncResult<()> {
        let Some(entity) = self.store.entity_by_path(&op.entity_key)? else {
            debug!(path = %op.entity_key, "untracked file, ignoring");
            return Ok(());
        };
        if is_container(&entity) {
            return Ok(());
        }
        let path = self.resolve_path(&entity)?;
        match read_local(&path).await? {
            None => self.handle_local_removal(&entity).await,
            Some(text) => {
                if op.kind == OperationKind::FileRemoved {
                    debug!(path = %op.entity_key, "file reappeared, treating as modified");
                }
                self.sync_local_entity(&entity, &text).await
            }
        }
    }

    /// Pushes a local edit, or merges when the page moved since the last sync.
    async fn sync_local_entity(&self, entity: &Entity, text: &str) -> SyncResult<()> {
        let (_, body) = split_frontmatter(text);
        let local_hash = content_hash(body);
        if entity.last_local_hash.as_deref() == Some(local_hash.as_str()) {
            debug!(path = %entity.local_path, "local content unchanged");
            return Ok(());
        }

        if let Some(known) = &entity.last_remote_version {
            let meta = match self.client.page_metadata(&entity.remote_id).await {
                Ok(meta) => meta,
                Err(e) if e.is_not_found() => return self.handle_remote_gone(entity).await,
                Err(e) => return Err(e),
            };
            if meta.archived || meta.version() != *known {
                debug!(path = %entity.local_path, "page changed remotely too, merging");
                return self.sync_remote_entity(entity).await;
            }
            if self.version_is_ambiguous(entity, &meta) {
                let path = self.resolve_path(entity)?;
                let Some(remote) = self.fetch_remote(entity).await? else {
                    return self.handle_remote_gone(entity).await;
                };
                if entity.last_remote_hash.as_deref() != Some(remote.hash.as_str()) {
                    debug!(path = %entity.local_path, "page changed within one version tick, merging");
                    return self.reconcile(entity, &path, remote).await;
                }
            }
        }
        self.push(entity, body).await
    }

    /// An unchanged version token proves nothing when the page was stamped
    /// within one edit-time tick of the last sync.
    fn version_is_ambiguous(&self, entity: &Entity, meta: &PageMetadata) -> bool {
        let granularity =
            i64::try_from(self.config.version_granularity.as_millis()).unwrap_or(i64::MAX);
        match entity.last_sync_at {
            Some(synced) => meta.edited_millis().saturating_add(granularity) >= synced,
            None => true,
        }
    }

    pub(super) async fn push(&self, entity: &Entity, body: &str) -> SyncResult<()> {
        let normalized = normalize(body);
        let local_hash = content_hash(&normalized);
        let wal_id = self.store.wal_begin(
            entity.id,
            WalOperation::Push,
            entity.base_content_id,
            &normalized,
        )?;

        let remote_markdown = match self.replace_remote(&entity.remote_id, &normalized).await {
            Ok(markdown) => markdown,
            Err(e) if e.is_not_found() => {
                self.store.wal_mark_rolled_back(wal_id)?;
                self.store.wal_delete(wal_id)?;
                return self.handle_remote_gone(entity).await;
            }
            Err(e) => return Err(e),
        };
        self.store.wal_mark_target_written(wal_id)?;

        let meta = self.fetch_version(&entity.remote_id).await;
        let base_content_id = self.store.upsert_content(&normalized)?;
        self.store.wal_commit_sync(
            wal_id,
            entity.id,
            &SyncUpdate {
                local_hash: local_hash.clone(),
                remote_hash: content_hash(&remote_markdown),
                remote_version: meta.as_ref().map(PageMetadata::version),
                base_content_id,
                synced_at: synced_at(meta.as_ref()),
            },
        )?;
        self.store.wal_delete(wal_id)?;
        self.retire_stale_wal(entity.id)?;
        self.store.clear_conflict(entity.id)?;

        self.store.append_log(
            Some(entity.id),
            LogOperation::Push,
            Some(Direction::LocalToRemote),
            &json!({ "path": entity.local_path, "hash": local_hash }),
        )?;
        info!(path = %entity.local_path, page = %entity.remote_id, "pushed");
        Ok(())
    }

    /// Replaces a page's content blocks with `markdown` under the page lock
    /// and returns what the page reads back as.
    ///
    /// Child-page blocks are left in place.
    pub(super) async fn replace_remote(&self, page_id: &str, markdown: &str) -> SyncResult<String> {
        let _guard = self.client.lock_page(page_id).await;
        let existing = self.client.list_all_blocks(page_id).await?;
        for block in existing
            .iter()
            .filter(|b| !matches!(b.content, BlockContent::ChildPage { .. }))
        {
            if let Some(id) = &block.id {
                self.client.delete_block(id).await?;
            }
        }
        let blocks = markdown_to_blocks(markdown);
        for chunk in blocks.chunks(MAX_BLOCKS_PER_APPEND) {
            self.client.append_blocks(page_id, chunk).await?;
        }
        Ok(self.read_back(page_id, markdown).await)
    }

    /// Reads a page back after a write. Falls back to what was written.
    async fn read_back(&self, page_id: &str, written: &str) -> String {
        match self.client.list_all_blocks(page_id).await {
            Ok(blocks) => normalize(&blocks_to_markdown(&blocks)),
            Err(e) => {
                warn!(page = page_id, error = %e, "read-back failed, assuming written content");
                normalize(written)
            }
        }
    }

    /// Metadata after a write. `None` keeps the stored version.
    pub(super) async fn fetch_version(&self, page_id: &str) -> Option<PageMetadata> {
        match self.client.page_metadata(page_id).await {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(page = page_id, error = %e, "could not refresh page version");
                None
            }
        }
    }

    /// Soft-deletes an entity whose file is gone and leaves a note on the page.
    async fn handle_local_removal(&self, entity: &Entity) -> SyncResult<()> {
        self.store.soft_delete(entity.id)?;
        self.store.append_log(
            Some(entity.id),
            LogOperation::Delete,
            Some(Direction::LocalToRemote),
            &json!({ "path": entity.local_path }),
        )?;
        info!(path = %entity.local_path, "local file removed, entity soft-deleted");

        let note = format!(
            "The local file {} was removed. This page is no longer synced.",
            entity.local_path
        );
        if let Err(e) = self.client.annotate_removed(&entity.remote_id, &note).await {
            warn!(page = %entity.remote_id, error = %e, "could not annotate removed page");
        }
        Ok(())
    }
}

/// Sync time that is never older than the page's own edit time.
pub(super) fn synced_at(meta: Option<&PageMetadata>) -> i64 {
    let now = now_millis();
    meta.map_or(now, |m| now.max(m.edited_millis()))
}
