//! Remote to local: pulls, merges and remote deletions.

use super::paths::{conflict_sibling, contained_path};
use super::push::{is_container, read_local, synced_at};
use super::{path_key, SyncEngine};
use crate::error::{SyncError, SyncResult};
use crate::remote::{PageMetadata, RemoteWorkspace};
use chrono::Utc;
use pagesync_protocol::{
    attach_frontmatter, blocks_to_markdown, content_hash, format_conflict_file, normalize,
    split_frontmatter, three_way_merge, ConflictStrategy, MergeOutcome, OperationKind,
    SyncOperation,
};
use pagesync_store::{Direction, Entity, LogOperation, SyncUpdate, WalOperation};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Current remote state of a page.
pub(super) struct RemotePage {
    pub(super) markdown: String,
    pub(super) hash: String,
    pub(super) meta: PageMetadata,
}

impl<R: RemoteWorkspace> SyncEngine<R> {
    pub(super) async fn process_remote(&self, op: &SyncOperation) -> SyncResult<()> {
        let Some(entity) = self.store.entity_by_remote_id(&op.entity_key)? else {
            debug!(page = %op.entity_key, "untracked page, ignoring");
            return Ok(());
        };
        match op.kind {
            OperationKind::PageDeleted => self.handle_remote_gone(&entity).await,
            _ => self.sync_remote_entity(&entity).await,
        }
    }

    /// Soft-deletes an entity whose page is gone. The local file stays.
    pub(super) async fn handle_remote_gone(&self, entity: &Entity) -> SyncResult<()> {
        self.store.soft_delete(entity.id)?;
        self.store.append_log(
            Some(entity.id),
            LogOperation::Delete,
            Some(Direction::RemoteToLocal),
            &json!({ "remote_id": entity.remote_id, "path": entity.local_path }),
        )?;
        info!(page = %entity.remote_id, path = %entity.local_path, "remote page gone, entity soft-deleted");
        Ok(())
    }

    /// Brings an entity up to date with its page: pull when only the page
    /// changed, merge when both sides did.
    pub(super) async fn sync_remote_entity(&self, entity: &Entity) -> SyncResult<()> {
        if is_container(entity) {
            return Ok(());
        }
        let path = self.resolve_path(entity)?;
        let Some(remote) = self.fetch_remote(entity).await? else {
            return self.handle_remote_gone(entity).await;
        };
        self.reconcile(entity, &path, remote).await
    }

    /// Pulls, merges or refreshes against an already fetched page.
    pub(super) async fn reconcile(
        &self,
        entity: &Entity,
        path: &Path,
        remote: RemotePage,
    ) -> SyncResult<()> {
        let local = read_local(path).await?;
        let local_hash = local
            .as_deref()
            .map(|text| content_hash(split_frontmatter(text).1));
        let local_changed = local_hash.is_some() && local_hash != entity.last_local_hash;

        if entity.last_remote_hash.as_deref() == Some(remote.hash.as_str()) {
            self.store
                .update_remote_version(entity.id, &remote.meta.version())?;
            debug!(page = %entity.remote_id, "page content unchanged");
            return match local {
                Some(text) if local_changed => self.push(entity, split_frontmatter(&text).1).await,
                _ => Ok(()),
            };
        }

        if local_hash.as_deref() == Some(remote.hash.as_str()) {
            let base_content_id = self.store.upsert_content(&remote.markdown)?;
            self.store.record_sync(
                entity.id,
                &SyncUpdate {
                    local_hash: remote.hash.clone(),
                    remote_hash: remote.hash.clone(),
                    remote_version: Some(remote.meta.version()),
                    base_content_id,
                    synced_at: synced_at(Some(&remote.meta)),
                },
            )?;
            debug!(page = %entity.remote_id, "both sides already agree");
            return Ok(());
        }

        match local {
            Some(text) if local_changed => self.merge(entity, path, &text, remote).await,
            other => self.pull(entity, path, other.as_deref(), remote).await,
        }
    }

    pub(super) async fn fetch_remote(&self, entity: &Entity) -> SyncResult<Option<RemotePage>> {
        let meta = match self.client.page_metadata(&entity.remote_id).await {
            Ok(meta) if meta.archived => return Ok(None),
            Ok(meta) => meta,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let blocks = match self.client.list_all_blocks(&entity.remote_id).await {
            Ok(blocks) => blocks,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let markdown = normalize(&blocks_to_markdown(&blocks));
        Ok(Some(RemotePage {
            hash: content_hash(&markdown),
            markdown,
            meta,
        }))
    }

    /// Writes the page content to the local file, keeping local frontmatter.
    async fn pull(
        &self,
        entity: &Entity,
        path: &Path,
        local: Option<&str>,
        remote: RemotePage,
    ) -> SyncResult<()> {
        let frontmatter = local.and_then(|text| split_frontmatter(text).0);
        let wal_id = self.store.wal_begin(
            entity.id,
            WalOperation::Pull,
            entity.base_content_id,
            &remote.markdown,
        )?;
        write_local(path, &attach_frontmatter(frontmatter, &remote.markdown)).await?;
        self.store.wal_mark_target_written(wal_id)?;

        let base_content_id = self.store.upsert_content(&remote.markdown)?;
        self.store.wal_commit_sync(
            wal_id,
            entity.id,
            &SyncUpdate {
                local_hash: remote.hash.clone(),
                remote_hash: remote.hash.clone(),
                remote_version: Some(remote.meta.version()),
                base_content_id,
                synced_at: synced_at(Some(&remote.meta)),
            },
        )?;
        self.store.wal_delete(wal_id)?;
        self.retire_stale_wal(entity.id)?;
        self.store.clear_conflict(entity.id)?;

        self.store.append_log(
            Some(entity.id),
            LogOperation::Pull,
            Some(Direction::RemoteToLocal),
            &json!({ "path": entity.local_path, "hash": remote.hash }),
        )?;
        info!(page = %entity.remote_id, path = %entity.local_path, "pulled");
        Ok(())
    }

    /// Three-way merges local and remote edits against the stored base.
    ///
    /// Entities that never synced merge against an empty base. Under
    /// [`ConflictStrategy::ConflictFile`] a conflicted merge writes nothing
    /// but the `.conflict` sibling.
    async fn merge(
        &self,
        entity: &Entity,
        path: &Path,
        local_text: &str,
        remote: RemotePage,
    ) -> SyncResult<()> {
        let (frontmatter, body) = split_frontmatter(local_text);
        let local = normalize(body);
        let base = match entity.base_content_id {
            Some(id) => self.store.content_text(id)?.unwrap_or_default(),
            None => String::new(),
        };
        let strategy = self.config.conflict_strategy;
        let outcome = three_way_merge(&base, &local, &remote.markdown, strategy);
        if outcome.has_conflicts() && strategy == ConflictStrategy::ConflictFile {
            return self
                .write_conflict_file(entity, path, &local, &remote, &outcome)
                .await;
        }

        let merged = normalize(&outcome.merged);
        let wal_id = self.store.wal_begin(
            entity.id,
            WalOperation::Merge,
            entity.base_content_id,
            &merged,
        )?;
        if merged != local {
            write_local(path, &attach_frontmatter(frontmatter, &merged)).await?;
        }
        let (remote_markdown, meta) = if merged == remote.markdown {
            (remote.markdown.clone(), Some(remote.meta.clone()))
        } else {
            let written = match self.replace_remote(&entity.remote_id, &merged).await {
                Ok(markdown) => markdown,
                Err(e) if e.is_not_found() => {
                    self.store.wal_mark_rolled_back(wal_id)?;
                    self.store.wal_delete(wal_id)?;
                    return self.handle_remote_gone(entity).await;
                }
                Err(e) => return Err(e),
            };
            (written, self.fetch_version(&entity.remote_id).await)
        };
        self.store.wal_mark_target_written(wal_id)?;

        let base_content_id = self.store.upsert_content(&merged)?;
        self.store.wal_commit_sync(
            wal_id,
            entity.id,
            &SyncUpdate {
                local_hash: content_hash(&merged),
                remote_hash: content_hash(&remote_markdown),
                remote_version: meta.as_ref().map(PageMetadata::version),
                base_content_id,
                synced_at: synced_at(meta.as_ref()),
            },
        )?;
        self.store.wal_delete(wal_id)?;
        self.retire_stale_wal(entity.id)?;

        if outcome.has_conflicts() {
            let local_id = self.store.upsert_content(&local)?;
            let remote_id = self.store.upsert_content(&remote.markdown)?;
            self.store.mark_conflict(entity.id, local_id, remote_id)?;
            self.store.append_log(
                Some(entity.id),
                LogOperation::Conflict,
                None,
                &json!({
                    "path": entity.local_path,
                    "strategy": strategy.as_str(),
                    "regions": outcome.conflicts,
                }),
            )?;
            warn!(
                path = %entity.local_path,
                regions = outcome.conflicts.len(),
                strategy = %strategy,
                "merge resolved conflicting edits"
            );
        } else {
            self.store.clear_conflict(entity.id)?;
        }
        self.store.append_log(
            Some(entity.id),
            LogOperation::Merge,
            None,
            &json!({
                "path": entity.local_path,
                "conflicts": outcome.conflicts.len(),
            }),
        )?;
        info!(path = %entity.local_path, page = %entity.remote_id, "merged");
        Ok(())
    }

    /// Writes both variants next to the file and marks the entity
    /// conflicted. Neither side's content changes.
    async fn write_conflict_file(
        &self,
        entity: &Entity,
        path: &Path,
        local: &str,
        remote: &RemotePage,
        outcome: &MergeOutcome,
    ) -> SyncResult<()> {
        let sibling = conflict_sibling(path);
        let contents = format_conflict_file(&path_key(path), local, &remote.markdown, Utc::now());
        write_local(&sibling, &contents).await?;

        let local_id = self.store.upsert_content(local)?;
        let remote_id = self.store.upsert_content(&remote.markdown)?;
        self.store.mark_conflict(entity.id, local_id, remote_id)?;
        self.store
            .update_remote_version(entity.id, &remote.meta.version())?;
        self.store.append_log(
            Some(entity.id),
            LogOperation::Conflict,
            None,
            &json!({
                "path": entity.local_path,
                "strategy": ConflictStrategy::ConflictFile.as_str(),
                "conflict_file": path_key(&sibling),
                "regions": outcome.conflicts,
            }),
        )?;
        warn!(
            path = %entity.local_path,
            conflict_file = %sibling.display(),
            "conflicting edits written to conflict file"
        );
        Ok(())
    }

    /// Validated local path of an entity.
    ///
    /// Paths must stay inside the owning project's directory, or inside the
    /// projects directory for entities without a project.
    pub(super) fn resolve_path(&self, entity: &Entity) -> SyncResult<PathBuf> {
        let root = match self.store.owning_project(entity.id)? {
            Some(project) if project.id != entity.id => PathBuf::from(project.local_path),
            _ => self.config.projects_dir.clone(),
        };
        contained_path(&root, Path::new(&entity.local_path)).inspect_err(|e| {
            if let SyncError::PathOutsideProject { path, root } = e {
                warn!(path = %path.display(), root = %root.display(), "refusing path outside project");
            }
        })
    }
}

async fn write_local(path: &Path, contents: &str) -> SyncResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await?;
    Ok(())
}
