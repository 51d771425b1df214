//! Database Connection Management
//!
//! This module provides the core database connection and initialization
//! functionality using libsql (embedded, SQLite-compatible).
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf
//! - **Shared tables**: `users` and `mindmaps`, created at startup
//! - **Per-mindmap tables**: `nodes_<id>` and `node_content_<id>`, created with
//!   the mindmap and dropped with it. Table names are built from the integer
//!   mindmap id only.
//! - **WAL mode**: Write-Ahead Logging for better concurrency
//! - **Foreign keys**: Enabled on every connection for referential integrity
//!
//! # Database Connection Patterns
//!
//! **ALWAYS use `connect_with_timeout()` in async functions.** The 5-second
//! busy timeout lets concurrent writers wait for the lock instead of failing
//! immediately with `SQLITE_BUSY`.
//!
//! ```no_run
//! # use mindnoscape_core::db::DatabaseService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db_service = DatabaseService::new(PathBuf::from("./data/mindnoscape.db")).await?;
//! let conn = db_service.connect_with_timeout().await?;
//! # Ok(())
//! # }
//! ```

use crate::db::error::DatabaseError;
use chrono::{DateTime, Utc};
use libsql::{Builder, Connection, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Name of the node table belonging to `mindmap_id`
pub fn nodes_table(mindmap_id: i64) -> String {
    format!("nodes_{}", mindmap_id)
}

/// Name of the node content table belonging to `mindmap_id`
pub fn node_content_table(mindmap_id: i64) -> String {
    format!("node_content_{}", mindmap_id)
}

/// Current time in the stored text format
pub(crate) fn timestamp_now() -> String {
    Utc::now().to_rfc3339()
}

/// Parse a stored RFC 3339 timestamp
pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::invalid_data(format!("timestamp '{}': {}", value, e)))
}

/// Database service for managing the libsql connection and schema
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,
}

impl DatabaseService {
    /// Create a new DatabaseService with the specified database path
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Initialize the shared schema (CREATE TABLE IF NOT EXISTS)
    /// 4. Enable SQLite features (WAL mode, foreign keys)
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
        };

        service.initialize_schema().await?;

        tracing::info!("Database ready at {}", service.db_path.display());
        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of execute().
    async fn execute_pragma(&self, conn: &Connection, pragma: &str) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Initialize shared tables and connection-independent settings
    ///
    /// Idempotent: safe to call on an existing database.
    async fn initialize_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                password_hash BLOB NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created TEXT NOT NULL,
                updated TEXT NOT NULL
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create users table: {}", e))
        })?;

        // Owner renames cascade; deleting an owner with mindmaps left is refused
        conn.execute(
            "CREATE TABLE IF NOT EXISTS mindmaps (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mindmap_name TEXT NOT NULL,
                owner TEXT NOT NULL,
                is_public INTEGER NOT NULL DEFAULT 0,
                created TEXT NOT NULL,
                updated TEXT NOT NULL,
                UNIQUE (mindmap_name, owner),
                FOREIGN KEY (owner) REFERENCES users(username) ON UPDATE CASCADE
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!(
                "Failed to create mindmaps table: {}",
                e
            ))
        })?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_mindmaps_owner ON mindmaps(owner)",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create owner index: {}", e))
        })?;

        Ok(())
    }

    /// Get a raw connection handle
    ///
    /// Prefer `connect_with_timeout()`: a raw connection has neither the busy
    /// timeout nor foreign key enforcement.
    pub fn connect(&self) -> Result<Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get an async connection with busy timeout and foreign keys configured
    pub async fn connect_with_timeout(&self) -> Result<Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        Ok(conn)
    }

    /// Start a write transaction, taking the write lock immediately
    pub async fn begin_transaction(conn: &Connection) -> Result<(), DatabaseError> {
        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;
        Ok(())
    }

    /// Commit the open transaction, rolling back if the commit fails
    pub async fn commit_transaction(conn: &Connection) -> Result<(), DatabaseError> {
        if let Err(e) = conn.execute("COMMIT", ()).await {
            Self::rollback_transaction(conn).await;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to commit transaction: {}",
                e
            )));
        }
        Ok(())
    }

    /// Roll back the open transaction; failures are only logged
    pub async fn rollback_transaction(conn: &Connection) {
        if let Err(e) = conn.execute("ROLLBACK", ()).await {
            tracing::warn!("Rollback failed: {}", e);
        }
    }

    /// Create the node tables for a new mindmap on `conn`
    ///
    /// Meant to run inside the transaction that inserts the mindmap row.
    pub async fn create_mindmap_tables(
        conn: &Connection,
        mindmap_id: i64,
    ) -> Result<(), DatabaseError> {
        let nodes = nodes_table(mindmap_id);
        let content = node_content_table(mindmap_id);

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {nodes} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    mindmap_id INTEGER NOT NULL,
                    parent_id INTEGER NOT NULL,
                    node_name TEXT NOT NULL,
                    index_value TEXT NOT NULL,
                    created TEXT NOT NULL,
                    updated TEXT NOT NULL,
                    FOREIGN KEY (mindmap_id) REFERENCES mindmaps(id)
                )"
            ),
            (),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to create {}: {}", nodes, e)))?;

        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_{nodes}_parent ON {nodes}(parent_id)"
            ),
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to index {}: {}", nodes, e))
        })?;

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {content} (
                    node_id INTEGER NOT NULL,
                    key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    UNIQUE (node_id, key),
                    FOREIGN KEY (node_id) REFERENCES {nodes}(id) ON DELETE CASCADE
                )"
            ),
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to create {}: {}", content, e))
        })?;

        Ok(())
    }

    /// Drop both node tables of a mindmap on `conn`, content first
    pub async fn drop_mindmap_tables(
        conn: &Connection,
        mindmap_id: i64,
    ) -> Result<(), DatabaseError> {
        for table in [node_content_table(mindmap_id), nodes_table(mindmap_id)] {
            conn.execute(&format!("DROP TABLE IF EXISTS {}", table), ())
                .await
                .map_err(|e| {
                    DatabaseError::sql_execution(format!("Failed to drop {}: {}", table, e))
                })?;
        }
        Ok(())
    }

    /// Whether the node table of `mindmap_id` exists
    pub async fn mindmap_tables_exist(&self, mindmap_id: i64) -> Result<bool, DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        let mut stmt = conn
            .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?")
            .await?;
        let mut rows = stmt.query([nodes_table(mindmap_id)]).await?;
        Ok(rows.next().await?.is_some())
    }
}
