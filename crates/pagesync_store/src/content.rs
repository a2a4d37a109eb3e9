//! Content-addressed blob store.

use crate::error::StoreResult;
use crate::store::{now_millis, Store};
use pagesync_protocol::{content_hash, normalize};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use tracing::debug;

/// A stored blob of normalized text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentBlob {
    /// Row id.
    pub id: i64,
    /// SHA-256 hex of the normalized text.
    pub content_hash: String,
    /// Normalized text.
    pub content: String,
    /// Creation time (Unix ms).
    pub created_at: i64,
}

impl Store {
    /// Stores `text` in normalized form and returns its blob id.
    ///
    /// Texts that normalize identically share one blob.
    pub fn upsert_content(&self, text: &str) -> StoreResult<i64> {
        let hash = content_hash(text);
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO content_blobs (content_hash, content, created_at)
             VALUES (?1, ?2, ?3)",
            params![hash, normalize(text), now_millis()],
        )?;
        let id = conn.query_row(
            "SELECT id FROM content_blobs WHERE content_hash = ?1",
            [&hash],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Returns a blob by id.
    pub fn content(&self, id: i64) -> StoreResult<Option<ContentBlob>> {
        let blob = self
            .conn()
            .query_row(
                "SELECT id, content_hash, content, created_at FROM content_blobs WHERE id = ?1",
                [id],
                |row| {
                    Ok(ContentBlob {
                        id: row.get(0)?,
                        content_hash: row.get(1)?,
                        content: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(blob)
    }

    /// Returns only the text of a blob.
    pub fn content_text(&self, id: i64) -> StoreResult<Option<String>> {
        Ok(self.content(id)?.map(|blob| blob.content))
    }

    /// Deletes blobs no entity, conflict marker or WAL row refers to.
    pub fn gc_orphaned_content(&self) -> StoreResult<usize> {
        let removed = self.conn().execute(
            "DELETE FROM content_blobs WHERE id NOT IN (
                SELECT base_content_id FROM entities WHERE base_content_id IS NOT NULL
                UNION SELECT conflict_local_content_id FROM entities
                    WHERE conflict_local_content_id IS NOT NULL
                UNION SELECT conflict_remote_content_id FROM entities
                    WHERE conflict_remote_content_id IS NOT NULL
                UNION SELECT old_base_id FROM sync_wal WHERE old_base_id IS NOT NULL
            )",
            [],
        )?;
        debug!(removed, "collected orphaned content blobs");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntityType, NewEntity, SyncUpdate};

    #[test]
    fn identical_normalized_text_is_stored_once() {
        let store = Store::in_memory().unwrap();
        let a = store.upsert_content("# T\r\n\r\n\r\nBody  \r\n").unwrap();
        let b = store.upsert_content("# T\n\nBody").unwrap();
        let c = store.upsert_content("# Other").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        let blob = store.content(a).unwrap().unwrap();
        assert_eq!(blob.content, "# T\n\nBody");
        assert_eq!(blob.content_hash, content_hash("# T\n\nBody"));
    }

    #[test]
    fn gc_keeps_referenced_blobs() {
        let store = Store::in_memory().unwrap();
        let entity = store
            .upsert_entity(&NewEntity::new("/p/doc.md", "page-1", EntityType::Doc))
            .unwrap();
        let base = store.upsert_content("base").unwrap();
        let local = store.upsert_content("local").unwrap();
        let remote = store.upsert_content("remote").unwrap();
        let orphan = store.upsert_content("orphan").unwrap();

        store
            .record_sync(
                entity.id,
                &SyncUpdate {
                    local_hash: content_hash("base"),
                    remote_hash: content_hash("base"),
                    remote_version: None,
                    base_content_id: base,
                    synced_at: now_millis(),
                },
            )
            .unwrap();
        store.mark_conflict(entity.id, local, remote).unwrap();

        assert_eq!(store.gc_orphaned_content().unwrap(), 1);
        assert!(store.content(orphan).unwrap().is_none());
        for id in [base, local, remote] {
            assert!(store.content(id).unwrap().is_some());
        }

        store.clear_conflict(entity.id).unwrap();
        assert_eq!(store.gc_orphaned_content().unwrap(), 2);
    }

    mod properties {
        use super::*;
        use pagesync_protocol::normalize;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn line_ending_noise_never_adds_a_blob(
                lines in prop::collection::vec("[a-z][a-z ]{0,15}", 1..8),
                crlf in any::<bool>(),
            ) {
                let store = Store::in_memory().unwrap();
                let newline = if crlf { "\r\n" } else { "\n" };
                let noisy = format!("{}{newline}", lines.join(&format!("  {newline}")));

                let first = store.upsert_content(&noisy).unwrap();
                let second = store.upsert_content(&normalize(&noisy)).unwrap();
                prop_assert_eq!(first, second);
            }
        }
    }
}
