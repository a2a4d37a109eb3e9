//! Store handle, connection setup and instance locking.

use crate::error::{StoreError, StoreResult};
use crate::schema::SCHEMA;
use fs2::FileExt;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OpenFlags};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Returns the current time in Unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Handle to the sync database.
///
/// A file-backed store holds an exclusive advisory lock on `<db>.lock` for its
/// whole lifetime, so exactly one engine owns the WAL and entity map.
#[derive(Debug)]
pub struct Store {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    _lock_file: Option<File>,
}

impl Store {
    /// Opens or creates a store at `path`, taking the instance lock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Locked`] if another process holds the lock.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_path = lock_path(path);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked(path.to_path_buf()));
        }

        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::init(&conn)?;
        info!(path = %path.display(), journal_mode = %mode, "opened sync store");

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
            _lock_file: Some(lock_file),
        })
    }

    /// Opens an existing store for inspection without taking the lock.
    ///
    /// Any write through this handle fails.
    pub fn open_read_only(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        debug!(path = %path.display(), "opened sync store read-only");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
            _lock_file: None,
        })
    }

    /// Creates an in-memory store.
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
            _lock_file: None,
        })
    }

    fn init(conn: &Connection) -> StoreResult<()> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Returns the database path, or `None` for an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Runs `PRAGMA quick_check` and returns true if the database is sound.
    pub fn quick_check(&self) -> StoreResult<bool> {
        let conn = self.conn();
        let result: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }
}

fn lock_path(db_path: &Path) -> PathBuf {
    let mut name = OsString::from(db_path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn in_memory_store_is_healthy() {
        let store = Store::in_memory().unwrap();
        assert!(store.quick_check().unwrap());
        assert!(store.path().is_none());
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("state").join("sync.db");

        let _first = Store::open(&db_path).unwrap();
        let second = Store::open(&db_path);
        assert!(matches!(second, Err(StoreError::Locked(_))));
        assert!(temp.path().join("state").join("sync.db.lock").exists());
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("sync.db");
        {
            let _store = Store::open(&db_path).unwrap();
        }
        let store = Store::open(&db_path).unwrap();
        assert!(store.quick_check().unwrap());
    }

    #[test]
    fn read_only_open_ignores_lock() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("sync.db");
        let _owner = Store::open(&db_path).unwrap();

        let reader = Store::open_read_only(&db_path).unwrap();
        assert!(reader.quick_check().unwrap());
    }
}
