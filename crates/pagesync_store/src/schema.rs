//! Database schema.

/// Schema applied on every open. All statements are idempotent.
pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS content_blobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_hash TEXT NOT NULL UNIQUE,
    content TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    local_path TEXT NOT NULL UNIQUE,
    remote_id TEXT NOT NULL UNIQUE,
    entity_type TEXT NOT NULL,
    parent_id INTEGER REFERENCES entities(id) ON DELETE SET NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    last_local_hash TEXT,
    last_remote_hash TEXT,
    last_remote_version TEXT,
    base_content_id INTEGER REFERENCES content_blobs(id) ON DELETE SET NULL,
    last_sync_at INTEGER,
    deleted INTEGER NOT NULL DEFAULT 0,
    deleted_at INTEGER,
    conflict_detected_at INTEGER,
    conflict_local_content_id INTEGER REFERENCES content_blobs(id) ON DELETE SET NULL,
    conflict_remote_content_id INTEGER REFERENCES content_blobs(id) ON DELETE SET NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entities_parent ON entities(parent_id);
CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type);
CREATE INDEX IF NOT EXISTS idx_entities_deleted ON entities(deleted, deleted_at);

CREATE TABLE IF NOT EXISTS sync_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id INTEGER REFERENCES entities(id) ON DELETE SET NULL,
    operation TEXT NOT NULL,
    direction TEXT,
    detail TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sync_log_entity ON sync_log(entity_id);
CREATE INDEX IF NOT EXISTS idx_sync_log_created ON sync_log(created_at);

CREATE TABLE IF NOT EXISTS sync_wal (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    operation TEXT NOT NULL,
    state TEXT NOT NULL,
    old_base_id INTEGER REFERENCES content_blobs(id) ON DELETE SET NULL,
    new_content TEXT,
    created_at INTEGER NOT NULL,
    completed_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_sync_wal_state ON sync_wal(state);

CREATE TABLE IF NOT EXISTS issue_snapshots (
    project_key TEXT PRIMARY KEY,
    snapshot_json TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;
