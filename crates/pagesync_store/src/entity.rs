//! Entity map: tracked local ↔ remote pairs.

use crate::error::{StoreError, StoreResult};
use crate::store::{now_millis, Store};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Kind of tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A project directory and its root page.
    Project,
    /// A markdown document inside a project.
    Doc,
    /// A reference document shared across projects.
    Reference,
    /// An issue-tracker mirror page.
    Issues,
    /// A remote database.
    Database,
    /// A row inside a remote database.
    Row,
}

impl EntityType {
    /// Returns the stored name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Project => "project",
            EntityType::Doc => "doc",
            EntityType::Reference => "reference",
            EntityType::Issues => "issues",
            EntityType::Database => "database",
            EntityType::Row => "row",
        }
    }

    /// Returns true for entities that group others and carry no mirrored
    /// page content of their own.
    pub fn is_container(&self) -> bool {
        matches!(self, EntityType::Project | EntityType::Database)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(EntityType::Project),
            "doc" => Ok(EntityType::Doc),
            "reference" => Ok(EntityType::Reference),
            "issues" => Ok(EntityType::Issues),
            "database" => Ok(EntityType::Database),
            "row" => Ok(EntityType::Row),
            other => Err(format!("unknown entity type: {other}")),
        }
    }
}

/// Marker left on an entity whose last merge found conflicting regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConflictMarker {
    /// When the conflict was detected (Unix ms).
    pub detected_at: i64,
    /// Content blob holding the local variant.
    pub local_content_id: i64,
    /// Content blob holding the remote variant.
    pub remote_content_id: i64,
}

/// A tracked local ↔ remote pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity {
    /// Row id.
    pub id: i64,
    /// Absolute local path.
    pub local_path: String,
    /// Remote page id.
    pub remote_id: String,
    /// Kind of entity.
    pub entity_type: EntityType,
    /// Parent entity, if any.
    pub parent_id: Option<i64>,
    /// Ordered tag list.
    pub tags: Vec<String>,
    /// Local content hash at last sync.
    pub last_local_hash: Option<String>,
    /// Remote content hash at last sync.
    pub last_remote_hash: Option<String>,
    /// Remote version token (last-edited time) at last sync.
    pub last_remote_version: Option<String>,
    /// Content blob of the last agreed version.
    pub base_content_id: Option<i64>,
    /// Last successful sync (Unix ms).
    pub last_sync_at: Option<i64>,
    /// Soft-delete flag.
    pub deleted: bool,
    /// When the entity was soft-deleted (Unix ms).
    pub deleted_at: Option<i64>,
    /// Conflict marker, if the last merge conflicted.
    pub conflict: Option<ConflictMarker>,
    /// Creation time (Unix ms).
    pub created_at: i64,
}

/// Registration request for an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntity {
    /// Absolute local path.
    pub local_path: String,
    /// Remote page id.
    pub remote_id: String,
    /// Kind of entity.
    pub entity_type: EntityType,
    /// Parent entity, if any.
    pub parent_id: Option<i64>,
    /// Ordered tag list.
    pub tags: Vec<String>,
}

impl NewEntity {
    /// Creates a registration with no parent and no tags.
    pub fn new(
        local_path: impl Into<String>,
        remote_id: impl Into<String>,
        entity_type: EntityType,
    ) -> Self {
        Self {
            local_path: local_path.into(),
            remote_id: remote_id.into(),
            entity_type,
            parent_id: None,
            tags: Vec::new(),
        }
    }

    /// Sets the parent entity.
    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Sets the tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Fields written after a successful push, pull or merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncUpdate {
    /// New local content hash.
    pub local_hash: String,
    /// New remote content hash.
    pub remote_hash: String,
    /// New remote version token, if known.
    pub remote_version: Option<String>,
    /// New merge base blob.
    pub base_content_id: i64,
    /// Sync time (Unix ms).
    pub synced_at: i64,
}

/// A conflicted entity together with both stored variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictRecord {
    /// The conflicted entity.
    pub entity: Entity,
    /// Local variant text.
    pub local_content: String,
    /// Remote variant text.
    pub remote_content: String,
}

const ENTITY_COLUMNS: &str = "id, local_path, remote_id, entity_type, parent_id, tags, \
     last_local_hash, last_remote_hash, last_remote_version, base_content_id, last_sync_at, \
     deleted, deleted_at, conflict_detected_at, conflict_local_content_id, \
     conflict_remote_content_id, created_at";

fn entity_from_row(row: &Row<'_>) -> rusqlite::Result<Entity> {
    let kind: String = row.get(3)?;
    let entity_type = kind.parse::<EntityType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into())
    })?;
    let tags_json: String = row.get(5)?;
    let tags = serde_json::from_str(&tags_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    let conflict = match (
        row.get::<_, Option<i64>>(13)?,
        row.get::<_, Option<i64>>(14)?,
        row.get::<_, Option<i64>>(15)?,
    ) {
        (Some(detected_at), Some(local_content_id), Some(remote_content_id)) => {
            Some(ConflictMarker {
                detected_at,
                local_content_id,
                remote_content_id,
            })
        }
        _ => None,
    };

    Ok(Entity {
        id: row.get(0)?,
        local_path: row.get(1)?,
        remote_id: row.get(2)?,
        entity_type,
        parent_id: row.get(4)?,
        tags,
        last_local_hash: row.get(6)?,
        last_remote_hash: row.get(7)?,
        last_remote_version: row.get(8)?,
        base_content_id: row.get(9)?,
        last_sync_at: row.get(10)?,
        deleted: row.get(11)?,
        deleted_at: row.get(12)?,
        conflict,
        created_at: row.get(16)?,
    })
}

fn query_one(conn: &Connection, clause: &str, key: &dyn rusqlite::ToSql) -> StoreResult<Option<Entity>> {
    let sql = format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE {clause}");
    Ok(conn.query_row(&sql, [key], entity_from_row).optional()?)
}

fn query_many(
    conn: &Connection,
    clause: &str,
    params: impl rusqlite::Params,
) -> StoreResult<Vec<Entity>> {
    let sql = format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE {clause}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params, entity_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn map_unique(err: rusqlite::Error, what: &str) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::Duplicate(what.to_string())
        }
        _ => StoreError::Sqlite(err),
    }
}

impl Store {
    /// Registers an entity, or revives and updates the row with the same path.
    ///
    /// Reviving clears the soft-delete flag and any conflict marker while
    /// keeping the row id and its history.
    pub fn upsert_entity(&self, new: &NewEntity) -> StoreResult<Entity> {
        let tags = serde_json::to_string(&new.tags)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO entities (local_path, remote_id, entity_type, parent_id, tags, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(local_path) DO UPDATE SET
                remote_id = excluded.remote_id,
                entity_type = excluded.entity_type,
                parent_id = excluded.parent_id,
                tags = excluded.tags,
                deleted = 0,
                deleted_at = NULL,
                conflict_detected_at = NULL,
                conflict_local_content_id = NULL,
                conflict_remote_content_id = NULL",
            params![
                new.local_path,
                new.remote_id,
                new.entity_type.as_str(),
                new.parent_id,
                tags,
                now_millis()
            ],
        )
        .map_err(|e| map_unique(e, &format!("remote id {}", new.remote_id)))?;

        let entity = query_one(&conn, "local_path = ?1", &new.local_path)?
            .ok_or(StoreError::Duplicate(new.local_path.clone()))?;
        debug!(entity_id = entity.id, path = %entity.local_path, "registered entity");
        Ok(entity)
    }

    /// Returns an entity by id, including soft-deleted rows.
    pub fn entity(&self, id: i64) -> StoreResult<Option<Entity>> {
        query_one(&self.conn(), "id = ?1", &id)
    }

    /// Returns the live entity tracking `local_path`.
    pub fn entity_by_path(&self, local_path: &str) -> StoreResult<Option<Entity>> {
        query_one(&self.conn(), "local_path = ?1 AND deleted = 0", &local_path)
    }

    /// Returns the live entity tracking `remote_id`.
    pub fn entity_by_remote_id(&self, remote_id: &str) -> StoreResult<Option<Entity>> {
        query_one(&self.conn(), "remote_id = ?1 AND deleted = 0", &remote_id)
    }

    /// Lists live entities, optionally restricted to one type.
    pub fn list_entities(&self, entity_type: Option<EntityType>) -> StoreResult<Vec<Entity>> {
        let conn = self.conn();
        match entity_type {
            Some(kind) => query_many(
                &conn,
                "deleted = 0 AND entity_type = ?1 ORDER BY id",
                [kind.as_str()],
            ),
            None => query_many(&conn, "deleted = 0 ORDER BY id", []),
        }
    }

    /// Soft-deletes an entity. No content is touched.
    pub fn soft_delete(&self, id: i64) -> StoreResult<()> {
        let changed = self.conn().execute(
            "UPDATE entities SET deleted = 1, deleted_at = ?2 WHERE id = ?1 AND deleted = 0",
            params![id, now_millis()],
        )?;
        if changed > 0 {
            info!(entity_id = id, "soft-deleted entity");
        }
        Ok(())
    }

    /// Hard-deletes entities soft-deleted before `cutoff` (Unix ms).
    pub fn gc_deleted_before(&self, cutoff: i64) -> StoreResult<usize> {
        let removed = self.conn().execute(
            "DELETE FROM entities WHERE deleted = 1 AND deleted_at < ?1",
            [cutoff],
        )?;
        if removed > 0 {
            info!(removed, "purged soft-deleted entities");
        }
        Ok(removed)
    }

    /// Hard-deletes entities soft-deleted longer than `retention` ago.
    pub fn gc_deleted(&self, retention: std::time::Duration) -> StoreResult<usize> {
        let retention_ms = i64::try_from(retention.as_millis()).unwrap_or(i64::MAX);
        self.gc_deleted_before(now_millis().saturating_sub(retention_ms))
    }

    /// Writes the post-sync hashes, version token and merge base.
    pub fn record_sync(&self, id: i64, update: &SyncUpdate) -> StoreResult<()> {
        record_sync_on(&self.conn(), id, update)
    }

    /// Refreshes only the remote version token.
    pub fn update_remote_version(&self, id: i64, version: &str) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE entities SET last_remote_version = ?2 WHERE id = ?1",
            params![id, version],
        )?;
        Ok(())
    }

    /// Marks an entity conflicted with both variants stored as blobs.
    pub fn mark_conflict(
        &self,
        id: i64,
        local_content_id: i64,
        remote_content_id: i64,
    ) -> StoreResult<()> {
        let changed = self.conn().execute(
            "UPDATE entities SET conflict_detected_at = ?2, conflict_local_content_id = ?3,
                conflict_remote_content_id = ?4 WHERE id = ?1",
            params![id, now_millis(), local_content_id, remote_content_id],
        )?;
        if changed == 0 {
            return Err(StoreError::entity_not_found(id));
        }
        info!(entity_id = id, "entity marked conflicted");
        Ok(())
    }

    /// Clears any conflict marker.
    pub fn clear_conflict(&self, id: i64) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE entities SET conflict_detected_at = NULL, conflict_local_content_id = NULL,
                conflict_remote_content_id = NULL WHERE id = ?1",
            [id],
        )?;
        Ok(())
    }

    /// Lists live conflicted entities with both variants.
    pub fn list_conflicts(&self) -> StoreResult<Vec<ConflictRecord>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {cols}, lc.content, rc.content
             FROM entities e
             JOIN content_blobs lc ON lc.id = e.conflict_local_content_id
             JOIN content_blobs rc ON rc.id = e.conflict_remote_content_id
             WHERE e.conflict_detected_at IS NOT NULL AND e.deleted = 0
             ORDER BY e.conflict_detected_at DESC",
            cols = ENTITY_COLUMNS
                .split(", ")
                .map(|c| format!("e.{}", c.trim()))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(ConflictRecord {
                entity: entity_from_row(row)?,
                local_content: row.get(17)?,
                remote_content: row.get(18)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Lists live children of `parent_id`, optionally of one type.
    pub fn children(
        &self,
        parent_id: i64,
        entity_type: Option<EntityType>,
    ) -> StoreResult<Vec<Entity>> {
        let conn = self.conn();
        match entity_type {
            Some(kind) => query_many(
                &conn,
                "parent_id = ?1 AND entity_type = ?2 AND deleted = 0 ORDER BY id",
                params![parent_id, kind.as_str()],
            ),
            None => query_many(
                &conn,
                "parent_id = ?1 AND deleted = 0 ORDER BY id",
                [parent_id],
            ),
        }
    }

    /// Returns the ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: i64) -> StoreResult<Vec<Entity>> {
        let conn = self.conn();
        let mut chain = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut current = query_one(&conn, "id = ?1", &id)?
            .ok_or_else(|| StoreError::entity_not_found(id))?;

        while let Some(parent_id) = current.parent_id {
            if !seen.insert(parent_id) {
                break;
            }
            match query_one(&conn, "id = ?1", &parent_id)? {
                Some(parent) => {
                    chain.push(parent.clone());
                    current = parent;
                }
                None => break,
            }
        }
        Ok(chain)
    }

    /// Returns the nearest project entity at or above `id`.
    pub fn owning_project(&self, id: i64) -> StoreResult<Option<Entity>> {
        let entity = self
            .entity(id)?
            .ok_or_else(|| StoreError::entity_not_found(id))?;
        if entity.entity_type == EntityType::Project {
            return Ok(Some(entity));
        }
        Ok(self
            .ancestors(id)?
            .into_iter()
            .find(|e| e.entity_type == EntityType::Project))
    }

    /// Lists live projects without a parent.
    pub fn top_level_projects(&self) -> StoreResult<Vec<Entity>> {
        query_many(
            &self.conn(),
            "entity_type = ?1 AND parent_id IS NULL AND deleted = 0 ORDER BY id",
            [EntityType::Project.as_str()],
        )
    }

    /// Moves an entity under a new parent, or detaches it.
    pub fn set_parent(&self, id: i64, parent_id: Option<i64>) -> StoreResult<()> {
        if parent_id == Some(id) {
            return Err(StoreError::Duplicate(format!("entity {id} as its own parent")));
        }
        let changed = self.conn().execute(
            "UPDATE entities SET parent_id = ?2 WHERE id = ?1",
            params![id, parent_id],
        )?;
        if changed == 0 {
            return Err(StoreError::entity_not_found(id));
        }
        Ok(())
    }

    /// Replaces an entity's tags.
    pub fn set_tags(&self, id: i64, tags: &[String]) -> StoreResult<()> {
        let json = serde_json::to_string(tags)?;
        let changed = self
            .conn()
            .execute("UPDATE entities SET tags = ?2 WHERE id = ?1", params![id, json])?;
        if changed == 0 {
            return Err(StoreError::entity_not_found(id));
        }
        Ok(())
    }
}

pub(crate) fn record_sync_on(conn: &Connection, id: i64, update: &SyncUpdate) -> StoreResult<()> {
    let changed = conn.execute(
        "UPDATE entities SET last_local_hash = ?2, last_remote_hash = ?3,
            last_remote_version = COALESCE(?4, last_remote_version),
            base_content_id = ?5, last_sync_at = ?6
         WHERE id = ?1",
        params![
            id,
            update.local_hash,
            update.remote_hash,
            update.remote_version,
            update.base_content_id,
            update.synced_at
        ],
    )?;
    if changed == 0 {
        return Err(StoreError::entity_not_found(id));
    }
    Ok(())
}
