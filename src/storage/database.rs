//! Database handle
//!
//! One SQLite connection shared by every store. The handle is opened and
//! migrated once at startup, then cloned into whatever needs it.

use crate::config::StorageConfig;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::migrations;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Shared, migrated SQLite connection
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (or create) the database file and bring its schema up to date
    pub fn open(config: &StorageConfig) -> StorageResult<Self> {
        let path = config.database_path.clone();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        let applied = migrations::run(&mut conn)?;
        tracing::info!(
            path = %path.display(),
            applied,
            version = migrations::latest_version(),
            "Database opened"
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path),
        })
    }

    /// Migrated in-memory database, for tests and offline tooling
    pub fn in_memory() -> StorageResult<Self> {
        let mut conn = Connection::open_in_memory()?;
        migrations::run(&mut conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Path of the backing file, `None` when in memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Lock(format!("Failed to acquire database lock: {}", e)))
    }

    /// Run `f` with the connection locked
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StorageResult<T>) -> StorageResult<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run `f` with the connection locked mutably (needed for transactions)
    pub fn with_conn_mut<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut conn = self.lock()?;
        f(&mut conn)
    }

    /// Current schema version
    pub fn schema_version(&self) -> StorageResult<i64> {
        self.with_conn(migrations::current_version)
    }

    /// Cheap round trip used by readiness probes
    pub fn ping(&self) -> StorageResult<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
    }
}
