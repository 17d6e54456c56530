//! Per-run snapshot directory creation.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::debug;

use crate::timestamp;

/// Lazily created, per-run timestamped directory under the history root.
///
/// The directory name is fixed at the instant of first demand. Concurrent
/// first callers synchronize on the inner cell, so exactly one directory is
/// created and every caller observes the same path; later calls return it
/// without touching the filesystem.
pub struct SnapshotDir {
    history_root: PathBuf,
    created: Mutex<Option<PathBuf>>,
}

impl SnapshotDir {
    pub fn new(history_root: impl Into<PathBuf>) -> Self {
        Self {
            history_root: history_root.into(),
            created: Mutex::new(None),
        }
    }

    /// Resolve the snapshot directory, creating it (including parents) on
    /// first use.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn get_or_create(&self) -> io::Result<PathBuf> {
        let mut created = self.created.lock().unwrap();
        if let Some(path) = created.as_ref() {
            return Ok(path.clone());
        }

        let path = self.history_root.join(timestamp::now_filesystem_safe());
        fs::create_dir_all(&path)?;
        debug!(?path, "Created snapshot directory");
        *created = Some(path.clone());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::thread;

    use tempfile::TempDir;

    #[test]
    fn test_nothing_created_before_first_demand() {
        let tmp = TempDir::new().unwrap();
        let history = tmp.path().join("deleted");
        let _snapshot = SnapshotDir::new(&history);
        assert!(!history.exists());
    }

    #[test]
    fn test_created_once_with_parents() {
        let tmp = TempDir::new().unwrap();
        let history = tmp.path().join("deleted");
        let snapshot = SnapshotDir::new(&history);

        let first = snapshot.get_or_create().unwrap();
        assert!(first.is_dir());
        assert_eq!(first.parent(), Some(history.as_path()));

        let second = snapshot.get_or_create().unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read_dir(&history).unwrap().count(), 1);
    }

    #[test]
    fn test_concurrent_callers_agree() {
        let tmp = TempDir::new().unwrap();
        let snapshot = Arc::new(SnapshotDir::new(tmp.path().join("deleted")));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let snapshot = Arc::clone(&snapshot);
                thread::spawn(move || snapshot.get_or_create().unwrap())
            })
            .collect();

        let paths: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(paths.windows(2).all(|pair| pair[0] == pair[1]));
    }
}
