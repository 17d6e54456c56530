//! Deletion detection after the collection phase.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::backup::{BackupProgress, ProgressSink};
use crate::catalog::Catalog;
use crate::change::ChangeType;
use crate::snapshot::SnapshotDir;
use crate::timestamp;

/// Archive and remove mirror files whose source no longer exists.
///
/// Walks one consistent read of the catalogue; rows already marked deleted
/// are skipped. For each vanished path the surviving mirror bytes are copied
/// into the run's snapshot directory, the mirror file is removed, and the
/// row is stamped `Deleted`. A catalogue failure stops the sweep.
pub fn sweep_deleted_files(
    source_root: &Path,
    mirror_root: &Path,
    snapshot: &SnapshotDir,
    catalog: &Catalog,
    progress: &ProgressSink,
) -> bool {
    let entries = match catalog.list_all() {
        Ok(entries) => entries,
        Err(err) => {
            warn!(%err, "Failed to read catalogue for deletion sweep");
            return false;
        }
    };

    for (path, status) in entries {
        if status == ChangeType::Deleted {
            continue;
        }

        let source_file = source_root.join(&path);
        if source_file.exists() {
            continue;
        }

        let snapshot_dir = match snapshot.get_or_create() {
            Ok(dir) => dir,
            Err(err) => {
                warn!(%err, "Failed to create snapshot directory");
                return false;
            }
        };

        let mirror_file = mirror_root.join(&path);
        if mirror_file.exists() {
            let archived = snapshot_dir.join(&path);
            if let Some(parent) = archived.parent() {
                if let Err(err) = fs::create_dir_all(parent) {
                    warn!(?parent, %err, "Failed to create directory");
                }
            }
            if let Err(err) = fs::copy(&mirror_file, &archived) {
                warn!(?mirror_file, %err, "Failed to archive deleted file");
            }
        }
        let _ = fs::remove_file(&mirror_file);

        if let Err(err) = catalog.mark_deleted(&path, &timestamp::now_filesystem_safe()) {
            warn!(path = %path, %err, "Failed to mark file as deleted");
            return false;
        }
        debug!(path = %path, "Archived deleted file");

        progress.report(&BackupProgress {
            stage: "deleted",
            processed: 0,
            total: 0,
            file: PathBuf::from(&path),
        });
    }

    true
}
