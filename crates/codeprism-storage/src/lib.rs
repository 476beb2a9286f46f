//! codeprism-storage: SQLite persistence for codeprism.
//!
//! Uses rusqlite with bundled SQLite (FTS5 and JSON functions), WAL mode and
//! versioned migrations. Mutating helpers take a `&Connection` so the sync
//! receiver, the invalidator and branch GC can compose them inside one
//! transaction via [`Storage::with_transaction`].

use codeprism_core::{CodeprismError, StorageConfig};
use rusqlite::{Connection, Transaction};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub mod cards;
pub mod context;
pub mod docs;
pub mod edges;
pub mod file_index;
pub mod flows;
pub mod gc;
pub mod invalidate;
mod migrations;
pub mod tuning;

pub use cards::KeywordHit;
pub use file_index::RepoProfile;
pub use gc::GcReport;

/// SQLite-backed store for the file index, cards, graph edges and docs.
///
/// Wraps `rusqlite::Connection` in a `Mutex` so it can be shared across the
/// watcher, the HTTP server and the background refresh job.
pub struct Storage {
    conn: Mutex<Connection>,
}

pub(crate) fn storage_err(e: rusqlite::Error) -> CodeprismError {
    CodeprismError::Storage(e.to_string())
}

pub(crate) fn timestamp(secs: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

impl Storage {
    /// Get a lock on the underlying connection.
    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>, CodeprismError> {
        self.conn
            .lock()
            .map_err(|e| CodeprismError::LockPoisoned(format!("storage: {e}")))
    }

    /// Open (or create) a database at `path` with default settings.
    pub fn open(path: &Path) -> Result<Self, CodeprismError> {
        Self::open_with(path, &StorageConfig::default())
    }

    /// Open (or create) a database, apply pragmas and run migrations.
    pub fn open_with(path: &Path, config: &StorageConfig) -> Result<Self, CodeprismError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(storage_err)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(storage_err)?;
        conn.pragma_update(None, "cache_size", -(i64::from(config.cache_size_mb) * 1000))
            .map_err(storage_err)?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(storage_err)?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(storage_err)?;
        conn.pragma_update(None, "temp_store", "MEMORY")
            .map_err(storage_err)?;
        conn.busy_timeout(std::time::Duration::from_secs(config.busy_timeout_secs))
            .map_err(storage_err)?;

        migrations::run_migrations(&conn)?;
        tracing::info!(path = %path.display(), "opened store");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, CodeprismError> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(storage_err)?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` inside one transaction: committed on `Ok`, rolled back on `Err`.
    pub fn with_transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, CodeprismError>,
    ) -> Result<T, CodeprismError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage_err)?;
        let out = f(&tx)?;
        tx.commit().map_err(storage_err)?;
        Ok(out)
    }

    /// Compute SHA-256 hash of file content.
    pub fn content_hash(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Counts reported by the health endpoint.
    pub fn stats(&self) -> Result<StoreStats, CodeprismError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM cards),
                (SELECT COUNT(*) FROM cards WHERE stale = 1),
                (SELECT COUNT(DISTINCT flow) FROM cards),
                (SELECT COUNT(*) FROM file_index),
                (SELECT COUNT(*) FROM graph_edges)",
            [],
            |row| {
                Ok(StoreStats {
                    cards: row.get::<_, i64>(0)? as usize,
                    stale_cards: row.get::<_, i64>(1)? as usize,
                    flows: row.get::<_, i64>(2)? as usize,
                    files: row.get::<_, i64>(3)? as usize,
                    edges: row.get::<_, i64>(4)? as usize,
                })
            },
        )
        .map_err(storage_err)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    pub cards: usize,
    pub stale_cards: usize,
    pub flows: usize,
    pub files: usize,
    pub edges: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_on_disk_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("codeprism.db");
        let storage = Storage::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(storage.stats().unwrap(), StoreStats::default());
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let storage = Storage::open_in_memory().unwrap();
        let result: Result<(), CodeprismError> = storage.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO tuning (key, value) VALUES ('scratch', 1.0)",
                [],
            )
            .map_err(storage_err)?;
            Err(CodeprismError::Internal("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(storage.tuning_f64("scratch", 0.0).unwrap(), 0.0);
    }

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(Storage::content_hash("a"), Storage::content_hash("a"));
        assert_ne!(Storage::content_hash("a"), Storage::content_hash("b"));
    }
}
