//! Database Connection Management
//!
//! This module provides database connection, schema initialization and the
//! transaction boundary for the organization store, using libsql.
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf, parent directories are created
//! - **WAL mode**: Write-Ahead Logging for better concurrency
//! - **Foreign keys**: Enabled on every connection for referential integrity
//! - **One transaction per operation**: `begin_transaction` / `finish_transaction`
//!
//! # Database Connection Patterns
//!
//! Use `connect_with_timeout()` in async functions. It configures the busy
//! timeout and foreign keys on the new connection, so concurrent writers wait
//! for the lock instead of failing with `SQLITE_BUSY`.
//!
//! ```no_run
//! # use orgtree_core::db::DatabaseService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db_service = DatabaseService::new(PathBuf::from("./data/orgtree.db")).await?;
//! let conn = db_service.connect_with_timeout().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::StoreConfig;
use crate::db::error::DatabaseError;
use libsql::{Builder, Connection, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Name of the organization table
pub const ORGANIZATION_TABLE: &str = "customizable_organization";

/// Database service for managing the libsql connection and schema
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,

    busy_timeout_ms: u64,
}

impl DatabaseService {
    /// Create a new DatabaseService with the specified database path and
    /// default settings.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        Self::with_config(&StoreConfig::new(db_path)).await
    }

    /// Open (or create) the database described by `config` and initialize
    /// the schema.
    pub async fn with_config(config: &StoreConfig) -> Result<Self, DatabaseError> {
        config
            .validate()
            .map_err(DatabaseError::initialization_failed)?;

        let db_path = config.database_path.clone();
        let is_new_database = !db_path.exists();

        // Ensure parent directory exists
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
            busy_timeout_ms: config.busy_timeout_ms,
        };

        service.initialize_schema(is_new_database).await?;
        tracing::info!("Opened organization store at {}", service.db_path.display());

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements may return rows, so they go through query() instead
    /// of execute(). The first row is stepped so the statement always runs.
    async fn execute_pragma(&self, conn: &Connection, pragma: &str) -> Result<(), DatabaseError> {
        let failed =
            |e: libsql::Error| DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e));

        let mut stmt = conn.prepare(pragma).await.map_err(failed)?;
        let mut rows = stmt.query(()).await.map_err(failed)?;
        rows.next().await.map_err(failed)?;
        Ok(())
    }

    /// Initialize database schema and configuration
    ///
    /// Idempotent: uses CREATE TABLE/INDEX IF NOT EXISTS.
    ///
    /// # Schema
    ///
    /// - `customizable_organization`: one row per node; `parent_id` and
    ///   `parent_order` hold the ordered parent/children relationship
    /// - `idx_org_parent`: ordered lookup of the children of a node
    async fn initialize_schema(&self, is_new_database: bool) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY NOT NULL,
                    name TEXT NOT NULL CHECK (length(name) <= 255),
                    display_name TEXT NOT NULL CHECK (length(display_name) <= 255),
                    parent_id TEXT,
                    parent_order INTEGER,
                    CONSTRAINT uk_org_name UNIQUE (name),
                    -- Deleting a parent turns its children into roots
                    FOREIGN KEY (parent_id) REFERENCES {table}(id) ON DELETE SET NULL
                )",
                table = ORGANIZATION_TABLE
            ),
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!(
                "Failed to create {} table: {}",
                ORGANIZATION_TABLE, e
            ))
        })?;

        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_org_parent ON {}(parent_id, parent_order)",
                ORGANIZATION_TABLE
            ),
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!(
                "Failed to create index 'idx_org_parent': {}",
                e
            ))
        })?;

        // Flush the schema to the main file for fresh databases so that a
        // second handle opened right away sees the table.
        if is_new_database {
            self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
                .await?;
        }

        Ok(())
    }

    /// Get a connection without per-connection configuration
    ///
    /// Prefer `connect_with_timeout()`; foreign keys are off on connections
    /// returned here.
    pub fn connect(&self) -> Result<Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get a connection with busy timeout and foreign keys configured
    pub async fn connect_with_timeout(&self) -> Result<Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(&conn, &format!("PRAGMA busy_timeout = {}", self.busy_timeout_ms))
            .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        Ok(conn)
    }

    /// Start a write transaction, taking the write lock immediately
    pub async fn begin_transaction(&self, conn: &Connection) -> Result<(), DatabaseError> {
        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;
        Ok(())
    }

    /// Start a read transaction (consistent snapshot for multi-statement reads)
    pub async fn begin_read_transaction(&self, conn: &Connection) -> Result<(), DatabaseError> {
        conn.execute("BEGIN DEFERRED", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin read transaction: {}", e))
        })?;
        Ok(())
    }

    /// End the transaction started on `conn` according to `result`.
    ///
    /// Commits on `Ok`; rolls back and returns the original error on `Err`.
    /// A failed commit is rolled back and reported as a SQL execution error.
    pub async fn finish_transaction<T>(
        &self,
        conn: &Connection,
        result: Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        match result {
            Ok(value) => {
                if let Err(e) = conn.execute("COMMIT", ()).await {
                    let _rollback = conn.execute("ROLLBACK", ()).await;
                    return Err(DatabaseError::sql_execution(format!(
                        "Failed to commit transaction: {}",
                        e
                    )));
                }
                Ok(value)
            }
            Err(err) => {
                tracing::warn!("Rolling back transaction: {}", err);
                let _rollback = conn.execute("ROLLBACK", ()).await;
                Err(err)
            }
        }
    }

    /// Flush the WAL into the main database file
    pub async fn db_close(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
            .await?;
        Ok(())
    }
}
