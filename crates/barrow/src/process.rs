//! Per-file backup processing.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::backup::{BackupProgress, ProgressSink};
use crate::catalog::Catalog;
use crate::change::ChangeType;
use crate::digest;
use crate::snapshot::SnapshotDir;
use crate::timestamp;

/// Classifies one source file against the catalogue and refreshes the
/// mirror, archiving the previous mirror bytes when the content changed.
///
/// Failures are folded into the shared success flag; processing always
/// continues with the remaining files. Filesystem copies are best-effort:
/// a failed copy is logged but only a catalogue inconsistency fails the run.
pub struct FileProcessor {
    source_root: PathBuf,
    mirror_root: PathBuf,
    snapshot: Arc<SnapshotDir>,
    catalog: Arc<Catalog>,
    progress: Arc<ProgressSink>,
    success: Arc<AtomicBool>,
    processed: AtomicUsize,
}

impl FileProcessor {
    pub fn new(
        source_root: PathBuf,
        mirror_root: PathBuf,
        snapshot: Arc<SnapshotDir>,
        catalog: Arc<Catalog>,
        progress: Arc<ProgressSink>,
        success: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source_root,
            mirror_root,
            snapshot,
            catalog,
            progress,
            success,
            processed: AtomicUsize::new(0),
        }
    }

    /// Process one file from the source tree.
    pub fn execute(&self, file: &Path) {
        let relative = match self.relative_path(file) {
            Some(relative) => relative,
            None => {
                warn!(?file, "Cannot resolve path relative to the source root");
                self.success.store(false, Ordering::Relaxed);
                return;
            }
        };

        let new_hash = match digest::hash_file(file) {
            Ok(hash) => hash,
            Err(err) => {
                warn!(?file, %err, "Failed to hash file");
                self.success.store(false, Ordering::Relaxed);
                return;
            }
        };

        let key = catalog_key(&relative);

        // A Deleted record is treated as no record at all, so a path that
        // reappears after a deletion is classified as Added again.
        let prior = match self.catalog.get(&key) {
            Ok(state) => state.filter(|state| state.status != ChangeType::Deleted),
            Err(err) => {
                warn!(path = %key, %err, "Failed to read catalogue entry");
                self.success.store(false, Ordering::Relaxed);
                return;
            }
        };

        let mirror_file = self.mirror_root.join(&relative);
        let (status, stamp) = match &prior {
            None => {
                copy_file(file, &mirror_file);
                (ChangeType::Added, timestamp::now_filesystem_safe())
            }
            Some(state) if state.hash != new_hash => {
                let snapshot_dir = match self.snapshot.get_or_create() {
                    Ok(dir) => dir,
                    Err(err) => {
                        warn!(%err, "Failed to create snapshot directory");
                        self.success.store(false, Ordering::Relaxed);
                        return;
                    }
                };
                // Archive the previous mirror bytes before overwriting. If
                // the mirror file vanished externally there is nothing to
                // archive; the fresh copy below recreates it.
                if mirror_file.exists() {
                    copy_file(&mirror_file, &snapshot_dir.join(&relative));
                }
                copy_file(file, &mirror_file);
                (ChangeType::Modified, timestamp::now_filesystem_safe())
            }
            Some(state) => (ChangeType::Unchanged, state.last_updated.clone()),
        };

        if let Err(err) = self.catalog.upsert(&key, &new_hash, status, &stamp) {
            warn!(path = %key, %err, "Failed to update catalogue entry");
            self.success.store(false, Ordering::Relaxed);
            return;
        }

        self.progress.report_with(|| BackupProgress {
            stage: "collecting",
            processed: self.processed.fetch_add(1, Ordering::Relaxed) + 1,
            total: 0,
            file: file.to_path_buf(),
        });
    }

    /// Path of `file` relative to the source root. For a single-file source
    /// rooted at its containing directory this is just the file name.
    fn relative_path(&self, file: &Path) -> Option<PathBuf> {
        match file.strip_prefix(&self.source_root) {
            Ok(relative) if relative.as_os_str().is_empty() || relative == Path::new(".") => {
                file.file_name().map(PathBuf::from)
            }
            Ok(relative) => Some(relative.to_path_buf()),
            Err(_) => None,
        }
    }
}

/// Catalogue keys are forward-slash normalized so they stay stable across
/// platforms.
fn catalog_key(relative: &Path) -> String {
    relative.to_string_lossy().replace('\\', "/")
}

/// Byte-for-byte copy with parents created as needed. Best-effort: failures
/// are logged, not propagated.
fn copy_file(from: &Path, to: &Path) {
    if let Some(parent) = to.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            warn!(?parent, %err, "Failed to create directory");
        }
    }
    if let Err(err) = fs::copy(from, to) {
        warn!(?from, ?to, %err, "Failed to copy file");
    }
}
