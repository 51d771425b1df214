//! Database Error Types
//!
//! This module defines error types for database operations, providing
//! clear error handling for connection, initialization, query and
//! constraint failures.

use std::path::PathBuf;
use thiserror::Error;

/// Database operation errors
///
/// Constraint failures reported by SQLite are classified into
/// [`DatabaseError::DuplicateKey`] and [`DatabaseError::ConstraintViolation`]
/// so the service layer can map them onto user-facing error kinds.
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

    /// Row addressed by key does not exist
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Unique constraint rejected the write
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Foreign key or other constraint rejected the write
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// libsql operation error
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// Stored value could not be decoded
    #[error("Invalid stored value: {0}")]
    InvalidData(String),
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

    /// Create a not found error
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    /// Create an invalid data error
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Classify a failed write by the driver message
    ///
    /// SQLite reports constraint failures only through the message text.
    pub fn from_write(context: impl Into<String>, error: libsql::Error) -> Self {
        let context = context.into();
        let message = error.to_string();
        if message.contains("UNIQUE constraint failed")
            || message.contains("PRIMARY KEY constraint failed")
        {
            Self::DuplicateKey(format!("{}: {}", context, message))
        } else if message.contains("constraint failed") {
            Self::ConstraintViolation(format!("{}: {}", context, message))
        } else {
            Self::sql_execution(format!("{}: {}", context, message))
        }
    }
}
