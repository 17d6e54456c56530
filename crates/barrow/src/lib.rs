//! Barrow - incremental snapshot backup engine
//!
//! Maintains a mirror of the current source tree under `<backup root>/backup/`,
//! preserves the previous content of modified and deleted files inside
//! per-run timestamped snapshot directories under `<backup root>/deleted/`,
//! and tracks per-file state (content hash, change status, last update) in a
//! SQLite catalogue. Successive runs classify each file against the catalogue
//! to decide what to archive.

pub mod backup;
pub mod catalog;
pub mod change;
pub mod digest;
pub mod process;
pub mod queue;
pub mod snapshot;
pub mod sweep;
pub mod timestamp;
pub mod walk;

pub use backup::{run_backup, BackupConfig, BackupProgress, ProgressFn, ProgressSink};
pub use catalog::{Catalog, CatalogError, FileState};
pub use change::ChangeType;
pub use digest::hash_file;
pub use process::FileProcessor;
pub use queue::WorkQueue;
pub use snapshot::SnapshotDir;
pub use sweep::sweep_deleted_files;
pub use walk::enumerate_files;
