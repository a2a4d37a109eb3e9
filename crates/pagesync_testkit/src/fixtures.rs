//! Test fixtures: temporary stores and project trees.

use pagesync_store::{Entity, EntityType, NewEntity, Store};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: Arc<Store>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates an in-memory store.
    pub fn memory() -> Self {
        Self {
            store: Arc::new(Store::in_memory().expect("Failed to open in-memory store")),
            _temp_dir: None,
        }
    }

    /// Creates a file-backed store in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Store::open(temp_dir.path().join("sync.db")).expect("Failed to open store");
        Self {
            store: Arc::new(store),
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the database path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().join("sync.db"))
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a temporary in-memory store.
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store.store)
}

/// Path as stored in the entity map.
pub fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// A projects directory holding one registered project and an in-memory store.
pub struct ProjectFixture {
    /// The store the project is registered in.
    pub store: Arc<Store>,
    /// The registered project entity.
    pub project: Entity,
    root: TempDir,
}

impl ProjectFixture {
    /// Creates `<tmp>/<name>` and registers it as a project with remote id
    /// `project-<name>`.
    pub fn new(name: &str) -> Self {
        let root = TempDir::new().expect("Failed to create temp directory");
        let dir = root.path().join(name);
        fs::create_dir_all(&dir).expect("Failed to create project directory");
        let store = Arc::new(Store::in_memory().expect("Failed to open in-memory store"));
        let project = store
            .upsert_entity(&NewEntity::new(
                path_string(&dir),
                format!("project-{name}"),
                EntityType::Project,
            ))
            .expect("Failed to register project");
        Self {
            store,
            project,
            root,
        }
    }

    /// The directory holding all projects.
    pub fn projects_dir(&self) -> &Path {
        self.root.path()
    }

    /// The project's own directory.
    pub fn project_dir(&self) -> PathBuf {
        PathBuf::from(&self.project.local_path)
    }

    /// Absolute path of a file inside the project.
    pub fn path(&self, relative: &str) -> PathBuf {
        self.project_dir().join(relative)
    }

    /// Writes a file inside the project, creating parent directories.
    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&path, contents).expect("Failed to write file");
        path
    }

    /// Reads a file inside the project.
    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative)).expect("Failed to read file")
    }

    /// Returns true if the file exists.
    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).exists()
    }

    /// Deletes a file inside the project.
    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.path(relative)).expect("Failed to remove file");
    }

    /// Registers a doc under the project without touching the disk.
    pub fn track_path(&self, relative: &str, remote_id: &str) -> Entity {
        self.store
            .upsert_entity(
                &NewEntity::new(path_string(&self.path(relative)), remote_id, EntityType::Doc)
                    .with_parent(self.project.id),
            )
            .expect("Failed to register doc")
    }

    /// Writes a file and registers it as a doc under the project.
    pub fn track_doc(&self, relative: &str, remote_id: &str, contents: &str) -> Entity {
        self.write(relative, contents);
        self.track_path(relative, remote_id)
    }

    /// Reloads an entity by id.
    pub fn reload(&self, entity: &Entity) -> Entity {
        self.store
            .entity(entity.id)
            .expect("Failed to load entity")
            .expect("Entity should exist")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let test_store = TestStore::memory();
        assert!(test_store.quick_check().unwrap());
        assert!(test_store.path().is_none());
    }

    #[test]
    fn test_file_store() {
        let test_store = TestStore::file();
        assert!(test_store.path().unwrap().exists());
    }

    #[test]
    fn test_with_temp_store() {
        let count = with_temp_store(|store| store.list_entities(None).unwrap().len());
        assert_eq!(count, 0);
    }

    #[test]
    fn test_project_fixture() {
        let fx = ProjectFixture::new("alpha");
        let doc = fx.track_doc("docs/notes.md", "page-1", "# Notes");

        assert!(fx.exists("docs/notes.md"));
        assert_eq!(fx.read("docs/notes.md"), "# Notes");
        assert_eq!(doc.parent_id, Some(fx.project.id));
        assert_eq!(
            fx.store.owning_project(doc.id).unwrap().unwrap().id,
            fx.project.id
        );
        assert!(fx.project_dir().starts_with(fx.projects_dir()));

        fx.remove("docs/notes.md");
        assert!(!fx.exists("docs/notes.md"));
        assert_eq!(fx.reload(&doc).remote_id, "page-1");
    }
}
