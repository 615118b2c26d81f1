//! Database - Shared SQLite handle
//!
//! One `Database` is shared (behind an `Arc`) by the registry, the ledger and
//! the query facade. It hands out connections that are safe to use from any
//! thread.
//!
//! # Key Points
//! - Connections come from an `r2d2` pool capped at `max_connections`; a
//!   checkout blocks up to `connection_timeout_ms` and then fails with
//!   `StorageUnavailable`
//! - In-memory databases pool exactly one connection
//! - Every connection runs with WAL, a busy timeout and foreign keys ON
//! - Schema creation is idempotent and runs on every open

use std::path::{Path, PathBuf};
use std::time::Duration;

use r2d2::{ManageConnection, Pool};
use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use super::error::{StoreError, StoreResult};
use crate::config::DatabaseConfig;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS segments (
        slug TEXT PRIMARY KEY,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS user_segments (
        user_id INTEGER NOT NULL REFERENCES users(id),
        slug TEXT NOT NULL REFERENCES segments(slug),
        PRIMARY KEY (user_id, slug)
    );

    -- Segment-side foreign key checks and cascades
    CREATE INDEX IF NOT EXISTS idx_user_segments_slug ON user_segments(slug);
"#;

/// Opens SQLite connections for the [`Database`] pool
#[derive(Debug, Clone)]
pub struct SqliteManager {
    path: Option<PathBuf>,
    busy_timeout: Duration,
}

impl SqliteManager {
    pub fn file(path: &Path, busy_timeout: Duration) -> Self {
        Self {
            path: Some(path.to_path_buf()),
            busy_timeout,
        }
    }

    pub fn memory(busy_timeout: Duration) -> Self {
        Self {
            path: None,
            busy_timeout,
        }
    }
}

impl r2d2::ManageConnection for SqliteManager {
    type Connection = Connection;
    type Error = rusqlite::Error;

    fn connect(&self) -> Result<Connection, rusqlite::Error> {
        let conn = match &self.path {
            Some(path) => {
                let conn = Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_WRITE
                        | OpenFlags::SQLITE_OPEN_CREATE
                        | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )?;
                conn.execute_batch("PRAGMA journal_mode=WAL;")?;
                conn
            }
            None => Connection::open_in_memory()?,
        };

        conn.busy_timeout(self.busy_timeout)?;
        // Foreign keys are per connection in SQLite
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(conn)
    }

    fn is_valid(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch("")
    }

    fn has_broken(&self, _conn: &mut Connection) -> bool {
        false
    }
}

/// A connection checked out of a [`Database`]
pub type PooledConnection = r2d2::PooledConnection<SqliteManager>;

/// Thread-safe handle to the segment store database
pub struct Database {
    pool: Pool<SqliteManager>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open or create a database file
    pub fn open(path: &Path, config: &DatabaseConfig) -> StoreResult<Self> {
        let manager = SqliteManager::file(path, config.busy_timeout());

        // Open once up front so a bad path or a non-database file fails here
        let conn = manager
            .connect()
            .map_err(|e| StoreError::unavailable(format!("Failed to open database: {}", e)))?;
        init_schema(&conn)?;
        drop(conn);

        let pool = Pool::builder()
            .max_size(config.max_connections.max(1))
            .min_idle(Some(1))
            .connection_timeout(config.connection_timeout())
            .build_unchecked(manager);

        debug!(
            path = %path.display(),
            max_connections = config.max_connections,
            "database opened"
        );
        Ok(Self {
            pool,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database (for testing)
    ///
    /// Every in-memory connection is its own database, so the pool holds
    /// exactly one that is never recycled.
    pub fn open_memory() -> StoreResult<Self> {
        let config = DatabaseConfig::default();
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connection_timeout(config.connection_timeout())
            .build(SqliteManager::memory(config.busy_timeout()))
            .map_err(StoreError::unavailable)?;

        let db = Self { pool, path: None };
        db.init_schema()?;
        Ok(db)
    }

    /// Create any missing tables. Safe to call repeatedly.
    pub fn init_schema(&self) -> StoreResult<()> {
        let conn = self.connection()?;
        init_schema(&conn)
    }

    /// Path of the database file, `None` when in memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Check out a connection, waiting up to the configured timeout when
    /// every pooled connection is in use
    pub fn connection(&self) -> StoreResult<PooledConnection> {
        self.pool.get().map_err(StoreError::unavailable)
    }
}

fn init_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
