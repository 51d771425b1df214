//! Service Layer Error Types
//!
//! This module defines error types for manager operations and the
//! [`ErrorKind`] labels every layer maps its errors onto.

use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable, user-facing error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    DuplicateKey,
    PermissionDenied,
    InvalidArgument,
    InvalidScope,
    InvalidOperation,
    RootProtected,
    MoveWouldCreateCycle,
    ParseError,
    FormatUnsupported,
    Backend,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::DuplicateKey => "duplicate key",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::InvalidScope => "invalid scope",
            ErrorKind::InvalidOperation => "invalid operation",
            ErrorKind::RootProtected => "root protected",
            ErrorKind::MoveWouldCreateCycle => "move would create cycle",
            ErrorKind::ParseError => "parse error",
            ErrorKind::FormatUnsupported => "format unsupported",
            ErrorKind::Backend => "backend error",
        };
        f.write_str(label)
    }
}

impl DatabaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DatabaseError::NotFound { .. } => ErrorKind::NotFound,
            DatabaseError::DuplicateKey(_) => ErrorKind::DuplicateKey,
            _ => ErrorKind::Backend,
        }
    }
}

/// Manager operation errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Parent node not found: {0}")]
    ParentNotFound(i64),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("{entity} already exists: {key}")]
    DuplicateKey { entity: &'static str, key: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The root node cannot be moved, deleted, or re-parented
    #[error("Root node is protected: {0}")]
    RootProtected(String),

    #[error("Cannot move node {node_id} under its own descendant {target_id}")]
    MoveWouldCreateCycle { node_id: i64, target_id: i64 },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unsupported format: {0}")]
    FormatUnsupported(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Initialization error: {0}")]
    InitializationError(String),
}

impl ServiceError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn duplicate_key(entity: &'static str, key: impl ToString) -> Self {
        Self::DuplicateKey {
            entity,
            key: key.to_string(),
        }
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn root_protected(msg: impl Into<String>) -> Self {
        Self::RootProtected(msg.into())
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    pub fn initialization(msg: impl Into<String>) -> Self {
        Self::InitializationError(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::NotFound { .. }
            | ServiceError::ParentNotFound(_)
            | ServiceError::NodeNotFound(_) => ErrorKind::NotFound,
            ServiceError::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            ServiceError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            ServiceError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ServiceError::RootProtected(_) => ErrorKind::RootProtected,
            ServiceError::MoveWouldCreateCycle { .. } => ErrorKind::MoveWouldCreateCycle,
            ServiceError::ParseError(_) => ErrorKind::ParseError,
            ServiceError::FormatUnsupported(_) => ErrorKind::FormatUnsupported,
            ServiceError::Database(e) => e.kind(),
            ServiceError::Serialization(_)
            | ServiceError::Io(_)
            | ServiceError::InitializationError(_) => ErrorKind::Backend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_errors_map_to_kinds() {
        let duplicate: ServiceError = DatabaseError::DuplicateKey("users".into()).into();
        assert_eq!(duplicate.kind(), ErrorKind::DuplicateKey);

        let missing: ServiceError = DatabaseError::not_found("Node", 4).into();
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let other: ServiceError = DatabaseError::sql_execution("boom").into();
        assert_eq!(other.kind(), ErrorKind::Backend);
    }

    #[test]
    fn test_tree_errors_map_to_kinds() {
        assert_eq!(ServiceError::root_protected("move").kind(), ErrorKind::RootProtected);
        assert_eq!(
            ServiceError::MoveWouldCreateCycle { node_id: 1, target_id: 3 }.kind(),
            ErrorKind::MoveWouldCreateCycle
        );
        assert_eq!(ServiceError::ParentNotFound(9).kind(), ErrorKind::NotFound);
    }
}
