//! Persistent per-path backup state.
//!
//! Backed by SQLite. Every thread gets a dedicated connection on first use;
//! the map from thread identity to connection is the only shared state.
//! Connections run in WAL mode with a five-second busy timeout and SQLite's
//! serialized threading mode, so concurrent workers need no locking beyond
//! their own connection.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use thiserror::Error;
use tracing::debug;

use crate::change::ChangeType;

/// How long a connection retries against a locked database before the
/// statement fails.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Catalogue error type.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Stored state for one source-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileState {
    pub hash: String,
    pub status: ChangeType,
    pub last_updated: String,
}

/// SQLite-backed catalogue of per-path backup state.
pub struct Catalog {
    db_path: PathBuf,
    connections: Mutex<HashMap<ThreadId, Arc<Mutex<Connection>>>>,
}

impl Catalog {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Get the calling thread's connection, opening it on first use.
    ///
    /// Each connection lives in its own `Arc<Mutex<_>>` so the map lock is
    /// released before any statement runs. The inner mutex is uncontended:
    /// only the owning thread ever locks it.
    fn connection(&self) -> Result<Arc<Mutex<Connection>>, CatalogError> {
        let thread_id = thread::current().id();
        let mut connections = self.connections.lock().unwrap();

        if let Some(connection) = connections.get(&thread_id) {
            return Ok(Arc::clone(connection));
        }

        let connection = Arc::new(Mutex::new(self.open_connection()?));
        connections.insert(thread_id, Arc::clone(&connection));
        Ok(connection)
    }

    fn open_connection(&self) -> Result<Connection, CatalogError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX
            | OpenFlags::SQLITE_OPEN_URI;
        let connection = Connection::open_with_flags(&self.db_path, flags)?;
        connection.busy_timeout(BUSY_TIMEOUT)?;
        connection.pragma_update(None, "journal_mode", "WAL")?;
        debug!(db_path = ?self.db_path, thread = ?thread::current().id(), "Opened catalogue connection");
        Ok(connection)
    }

    /// Create the `files` table if it does not exist. Idempotent.
    pub fn initialize_schema(&self) -> Result<(), CatalogError> {
        let connection = self.connection()?;
        let connection = connection.lock().unwrap();
        connection.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                path         TEXT PRIMARY KEY,
                hash         TEXT NOT NULL,
                last_updated TEXT NOT NULL,
                status       TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Insert or replace the state stored for `path`.
    pub fn upsert(
        &self,
        path: &str,
        hash: &str,
        status: ChangeType,
        timestamp: &str,
    ) -> Result<(), CatalogError> {
        let connection = self.connection()?;
        let connection = connection.lock().unwrap();
        connection.execute(
            "INSERT INTO files (path, hash, status, last_updated)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(path) DO UPDATE SET
                 hash = excluded.hash,
                 status = excluded.status,
                 last_updated = excluded.last_updated",
            params![path, hash, status.as_str(), timestamp],
        )?;
        Ok(())
    }

    /// Fetch the current state stored for `path`, if any.
    pub fn get(&self, path: &str) -> Result<Option<FileState>, CatalogError> {
        let connection = self.connection()?;
        let connection = connection.lock().unwrap();
        let state = connection
            .query_row(
                "SELECT hash, status, last_updated FROM files WHERE path = ?1",
                params![path],
                |row| {
                    Ok(FileState {
                        hash: row.get(0)?,
                        status: ChangeType::parse(&row.get::<_, String>(1)?),
                        last_updated: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(state)
    }

    /// Read every `(path, status)` pair in one consistent scan.
    pub fn list_all(&self) -> Result<Vec<(String, ChangeType)>, CatalogError> {
        let connection = self.connection()?;
        let connection = connection.lock().unwrap();
        let mut statement = connection.prepare("SELECT path, status FROM files")?;
        let rows = statement.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                ChangeType::parse(&row.get::<_, String>(1)?),
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (path, status) = row?;
            if path.is_empty() {
                continue;
            }
            entries.push((path, status));
        }
        Ok(entries)
    }

    /// Mark `path` as deleted, preserving its last content hash.
    pub fn mark_deleted(&self, path: &str, timestamp: &str) -> Result<(), CatalogError> {
        let connection = self.connection()?;
        let connection = connection.lock().unwrap();
        connection.execute(
            "UPDATE files SET status = ?1, last_updated = ?2 WHERE path = ?3",
            params![ChangeType::Deleted.as_str(), timestamp, path],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn open_catalog(tmp: &TempDir) -> Catalog {
        let catalog = Catalog::new(tmp.path().join("state.db"));
        catalog.initialize_schema().unwrap();
        catalog
    }

    #[test]
    fn test_schema_init_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let catalog = open_catalog(&tmp);
        catalog.initialize_schema().unwrap();
    }

    #[test]
    fn test_get_missing_returns_none() {
        let tmp = TempDir::new().unwrap();
        let catalog = open_catalog(&tmp);
        assert_eq!(catalog.get("nope.txt").unwrap(), None);
    }

    #[test]
    fn test_upsert_and_get() {
        let tmp = TempDir::new().unwrap();
        let catalog = open_catalog(&tmp);

        catalog
            .upsert("a.txt", "abc123", ChangeType::Added, "2024-01-01_00-00-00")
            .unwrap();

        let state = catalog.get("a.txt").unwrap().unwrap();
        assert_eq!(state.hash, "abc123");
        assert_eq!(state.status, ChangeType::Added);
        assert_eq!(state.last_updated, "2024-01-01_00-00-00");
    }

    #[test]
    fn test_upsert_replaces_by_path() {
        let tmp = TempDir::new().unwrap();
        let catalog = open_catalog(&tmp);

        catalog
            .upsert("a.txt", "abc123", ChangeType::Added, "2024-01-01_00-00-00")
            .unwrap();
        catalog
            .upsert("a.txt", "def456", ChangeType::Modified, "2024-01-02_00-00-00")
            .unwrap();

        let state = catalog.get("a.txt").unwrap().unwrap();
        assert_eq!(state.hash, "def456");
        assert_eq!(state.status, ChangeType::Modified);

        assert_eq!(catalog.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_mark_deleted_preserves_hash() {
        let tmp = TempDir::new().unwrap();
        let catalog = open_catalog(&tmp);

        catalog
            .upsert("a.txt", "abc123", ChangeType::Added, "2024-01-01_00-00-00")
            .unwrap();
        catalog.mark_deleted("a.txt", "2024-01-03_00-00-00").unwrap();

        let state = catalog.get("a.txt").unwrap().unwrap();
        assert_eq!(state.hash, "abc123");
        assert_eq!(state.status, ChangeType::Deleted);
        assert_eq!(state.last_updated, "2024-01-03_00-00-00");
    }

    #[test]
    fn test_list_all() {
        let tmp = TempDir::new().unwrap();
        let catalog = open_catalog(&tmp);

        catalog
            .upsert("a.txt", "h1", ChangeType::Added, "2024-01-01_00-00-00")
            .unwrap();
        catalog
            .upsert("sub/b.txt", "h2", ChangeType::Modified, "2024-01-01_00-00-01")
            .unwrap();

        let mut entries = catalog.list_all().unwrap();
        entries.sort();
        assert_eq!(
            entries,
            vec![
                ("a.txt".to_string(), ChangeType::Added),
                ("sub/b.txt".to_string(), ChangeType::Modified),
            ]
        );
    }

    #[test]
    fn test_unknown_status_text_decodes_to_unchanged() {
        let tmp = TempDir::new().unwrap();
        let catalog = open_catalog(&tmp);

        // Write a row with a status this version does not know about.
        let raw = Connection::open(tmp.path().join("state.db")).unwrap();
        raw.execute(
            "INSERT INTO files (path, hash, last_updated, status) VALUES (?1, ?2, ?3, ?4)",
            params!["weird.txt", "h", "2024-01-01_00-00-00", "Relocated"],
        )
        .unwrap();

        let state = catalog.get("weird.txt").unwrap().unwrap();
        assert_eq!(state.status, ChangeType::Unchanged);
    }

    #[test]
    fn test_concurrent_upserts_from_many_threads() {
        use std::sync::Arc;

        let tmp = TempDir::new().unwrap();
        let catalog = Arc::new(open_catalog(&tmp));

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let catalog = Arc::clone(&catalog);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        catalog
                            .upsert(
                                &format!("w{worker}/f{i}.txt"),
                                "h",
                                ChangeType::Added,
                                "2024-01-01_00-00-00",
                            )
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(catalog.list_all().unwrap().len(), 100);
    }
}
