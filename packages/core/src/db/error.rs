//! Database Error Types
//!
//! This module defines error types for database operations: connection and
//! initialization failures, SQL failures, and the outcomes of applying
//! relationship changes inside a transaction.

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Primary result code shared by all constraint failures
const SQLITE_CONSTRAINT: i32 = 19;

/// Database operation errors
///
/// Service-layer code lifts `NotFound`, `ConstraintViolation`,
/// `CircularReference` and `UnknownReference` into their own variants; the
/// rest surfaces as a generic database failure.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish database connection
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to initialize database schema
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// Permission denied when accessing database
    #[error("Permission denied for database path: {path}")]
    PermissionDenied { path: PathBuf },

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// No row with this identifier
    #[error("Organization not found: {id}")]
    NotFound { id: Uuid },

    /// A UNIQUE or other constraint rejected the write
    #[error("Constraint violation: {context}")]
    ConstraintViolation { context: String },

    /// The write would make a node its own ancestor
    #[error("Circular reference detected: {context}")]
    CircularReference { context: String },

    /// A relationship change references a node that is not stored
    #[error("Referenced organization does not exist: {id}")]
    UnknownReference { id: Uuid },

    /// A stored row could not be decoded
    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

impl DatabaseError {
    /// Create a connection failed error
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a permission denied error
    pub fn permission_denied(path: PathBuf) -> Self {
        Self::PermissionDenied { path }
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    /// Create a circular reference error
    pub fn circular_reference(context: impl Into<String>) -> Self {
        Self::CircularReference {
            context: context.into(),
        }
    }

    /// Classify a failed write: failures in the SQLITE_CONSTRAINT family
    /// keep the driver message, everything else becomes a SQL execution error.
    pub fn from_write(context: &str, source: libsql::Error) -> Self {
        let is_constraint = match &source {
            libsql::Error::SqliteFailure(code, _) => code & 0xff == SQLITE_CONSTRAINT,
            other => other.to_string().contains("constraint failed"),
        };

        let context = format!("{}: {}", context, source);
        if is_constraint {
            Self::ConstraintViolation { context }
        } else {
            Self::sql_execution(context)
        }
    }
}
