//! Backup run orchestration.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::process::FileProcessor;
use crate::queue::{self, WorkQueue};
use crate::snapshot::SnapshotDir;
use crate::sweep;
use crate::walk;

/// One progress event emitted during a run.
///
/// `stage` is `"collecting"` while files are processed (with a monotonically
/// increasing `processed` count and `total` of 0) and `"deleted"` during the
/// deletion sweep (both counters 0).
#[derive(Debug, Clone)]
pub struct BackupProgress {
    pub stage: &'static str,
    pub processed: usize,
    pub total: usize,
    pub file: PathBuf,
}

/// Progress callback. Invocations are serialized, so the callback sees a
/// single ordered stream even with many workers.
pub type ProgressFn = dyn Fn(&BackupProgress) + Send + Sync;

/// Configuration for one backup run.
pub struct BackupConfig {
    /// Directory tree (or single regular file) to back up.
    pub source_dir: PathBuf,
    /// Root under which `backup/` and `deleted/` are maintained.
    pub backup_root: PathBuf,
    /// Location of the SQLite catalogue.
    pub database_file: PathBuf,
    /// Reporting hint for front-ends; the engine itself ignores it.
    pub verbose: bool,
    /// Optional progress callback.
    pub on_progress: Option<Box<ProgressFn>>,
}

/// Serializes progress callbacks across worker threads.
pub struct ProgressSink {
    callback: Option<Box<ProgressFn>>,
    lock: Mutex<()>,
}

impl ProgressSink {
    pub fn new(callback: Option<Box<ProgressFn>>) -> Self {
        Self {
            callback,
            lock: Mutex::new(()),
        }
    }

    pub fn report(&self, progress: &BackupProgress) {
        if let Some(callback) = &self.callback {
            let _guard = self.lock.lock().unwrap();
            callback(progress);
        }
    }

    /// Build and deliver an event under the serialization lock. Lets the
    /// caller sample counters inside the critical section, so the observed
    /// stream stays monotonic.
    pub fn report_with<F>(&self, progress: F)
    where
        F: FnOnce() -> BackupProgress,
    {
        if let Some(callback) = &self.callback {
            let _guard = self.lock.lock().unwrap();
            callback(&progress());
        }
    }
}

/// Run one incremental backup.
///
/// Mirrors the current source tree under `<backup_root>/backup/`, archives
/// the previous content of modified and deleted files under a per-run
/// timestamped directory in `<backup_root>/deleted/`, and records per-file
/// state in the catalogue. Returns `true` only if every file was processed
/// successfully and the deletion sweep completed.
pub fn run_backup(config: BackupConfig) -> bool {
    let mirror_root = config.backup_root.join("backup");
    let history_root = config.backup_root.join("deleted");
    if let Err(err) = fs::create_dir_all(&mirror_root) {
        warn!(path = ?mirror_root, %err, "Failed to create mirror root");
    }
    if let Err(err) = fs::create_dir_all(&history_root) {
        warn!(path = ?history_root, %err, "Failed to create history root");
    }

    // Canonicalize once so catalogue keys stay stable across invocations.
    let source = match config.source_dir.canonicalize() {
        Ok(source) => source,
        Err(err) => {
            warn!(source = ?config.source_dir, %err, "Invalid source path");
            return false;
        }
    };
    let source_root = if source.is_file() {
        match source.parent() {
            Some(parent) => parent.to_path_buf(),
            None => {
                warn!(?source, "Source file has no containing directory");
                return false;
            }
        }
    } else if source.is_dir() {
        source.clone()
    } else {
        warn!(?source, "Source is neither a regular file nor a directory");
        return false;
    };

    let catalog = Arc::new(Catalog::new(&config.database_file));
    if let Err(err) = catalog.initialize_schema() {
        warn!(database = ?config.database_file, %err, "Failed to initialize catalogue schema");
        return false;
    }

    let success = Arc::new(AtomicBool::new(true));
    let snapshot = Arc::new(SnapshotDir::new(&history_root));
    let progress = Arc::new(ProgressSink::new(config.on_progress));

    let processor = FileProcessor::new(
        source_root.clone(),
        mirror_root.clone(),
        Arc::clone(&snapshot),
        Arc::clone(&catalog),
        Arc::clone(&progress),
        Arc::clone(&success),
    );

    let worker_count = queue::default_worker_count();
    info!(?source, workers = worker_count, "Starting backup");

    let mut file_queue = WorkQueue::start(worker_count, move |file| processor.execute(file));
    walk::enumerate_files(&source, |file| file_queue.enqueue(file.to_path_buf()));
    file_queue.finalize();

    if success.load(Ordering::Relaxed) {
        let swept = sweep::sweep_deleted_files(
            &source_root,
            &mirror_root,
            &snapshot,
            &catalog,
            &progress,
        );
        success.store(swept, Ordering::Relaxed);
    }

    let result = success.load(Ordering::Relaxed);
    info!(success = result, "Backup finished");
    result
}
