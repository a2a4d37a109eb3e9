//! Containment checks for paths written by the engine.

use crate::error::{SyncError, SyncResult};
use std::path::{Component, Path, PathBuf};

/// Resolves `.` and `..` without touching the filesystem. Returns `None`
/// when `..` climbs above the start of the path.
pub(crate) fn lexical_normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                ) {
                    return None;
                }
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}

/// Resolves `candidate` against `root` and checks that it stays strictly
/// inside `root`. Relative candidates are joined onto `root`.
pub fn contained_path(root: &Path, candidate: &Path) -> SyncResult<PathBuf> {
    let outside = || SyncError::PathOutsideProject {
        path: candidate.to_path_buf(),
        root: root.to_path_buf(),
    };
    let root_norm = lexical_normalize(root).ok_or_else(outside)?;
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root_norm.join(candidate)
    };
    let resolved = lexical_normalize(&joined).ok_or_else(outside)?;
    if resolved == root_norm || !resolved.starts_with(&root_norm) {
        return Err(outside());
    }
    Ok(resolved)
}

/// Sibling file that receives both versions in conflict-file mode.
pub(crate) fn conflict_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".conflict");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_paths_are_accepted() {
        let root = Path::new("/srv/projects/alpha");
        assert_eq!(
            contained_path(root, Path::new("/srv/projects/alpha/docs/a.md")).unwrap(),
            PathBuf::from("/srv/projects/alpha/docs/a.md")
        );
        assert_eq!(
            contained_path(root, Path::new("docs/./b.md")).unwrap(),
            PathBuf::from("/srv/projects/alpha/docs/b.md")
        );
        assert_eq!(
            contained_path(root, Path::new("/srv/projects/alpha/docs/../c.md")).unwrap(),
            PathBuf::from("/srv/projects/alpha/c.md")
        );
    }

    #[test]
    fn traversal_is_rejected() {
        let root = Path::new("/srv/projects/alpha");
        for bad in [
            "../../etc/passwd",
            "/srv/projects/alpha/../beta/a.md",
            "/etc/passwd",
            "/srv/projects/alpha",
            "/srv/projects/alpha-evil/a.md",
            "docs/../../x.md",
        ] {
            let err = contained_path(root, Path::new(bad)).unwrap_err();
            assert!(
                matches!(err, SyncError::PathOutsideProject { .. }),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn normalize_refuses_to_climb_above_start() {
        assert!(lexical_normalize(Path::new("/../x")).is_none());
        assert!(lexical_normalize(Path::new("a/../../x")).is_none());
        assert_eq!(
            lexical_normalize(Path::new("a/./b/../c")),
            Some(PathBuf::from("a/c"))
        );
    }

    #[test]
    fn conflict_sibling_appends_suffix() {
        assert_eq!(
            conflict_sibling(Path::new("/p/a/doc.md")),
            PathBuf::from("/p/a/doc.md.conflict")
        );
    }
}
