//! Temp files waiting for their assignment to finish.

use std::path::{Path, PathBuf};

use crate::error::CleanupError;

/// Paths created while marshaling one assignment.
///
/// Paths are kept in registration order and each is deleted at most once:
/// `purge` empties the set whether or not the deletions succeed.
#[derive(Debug, Default)]
pub struct PendingDeleteSet {
    paths: Vec<PathBuf>,
}

impl PendingDeleteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path; registering the same path twice keeps one entry.
    pub fn register(&mut self, path: PathBuf) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    /// Delete every registered path, collecting failures.
    pub fn purge(&mut self) -> Result<(), CleanupError> {
        let mut failures = Vec::new();
        for path in self.paths.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::trace!(path = %path.display(), "removed spool file"),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove spool file");
                    failures.push((path, e));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CleanupError { failures })
        }
    }
}

impl Drop for PendingDeleteSet {
    fn drop(&mut self) {
        if !self.paths.is_empty() {
            let _ = self.purge();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purge_removes_files_once() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, "1").unwrap();
        std::fs::write(&b, "2").unwrap();

        let mut set = PendingDeleteSet::new();
        set.register(a.clone());
        set.register(b.clone());
        set.register(a.clone());
        assert_eq!(set.len(), 2);

        set.purge().unwrap();
        assert!(!a.exists());
        assert!(!b.exists());
        assert!(set.is_empty());
        // Nothing left to delete the second time
        set.purge().unwrap();
    }

    #[test]
    fn failures_do_not_stop_remaining_deletions() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.txt");
        let present = dir.path().join("present.txt");
        std::fs::write(&present, "x").unwrap();

        let mut set = PendingDeleteSet::new();
        set.register(missing.clone());
        set.register(present.clone());

        let err = set.purge().unwrap_err();
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].0, missing);
        assert!(!present.exists());
        assert!(set.is_empty());
    }

    #[test]
    fn drop_purges_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leftover.txt");
        std::fs::write(&path, "x").unwrap();
        {
            let mut set = PendingDeleteSet::new();
            set.register(path.clone());
            assert!(set.contains(&path));
        }
        assert!(!path.exists());
    }
}
