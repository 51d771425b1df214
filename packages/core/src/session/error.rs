//! Session pipeline errors

use crate::services::{ErrorKind, ServiceError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Unknown scope: {0}")]
    InvalidScope(String),

    #[error("Unknown operation '{operation}' in scope '{scope}'")]
    InvalidOperation { scope: String, operation: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("No user selected")]
    NoUserSelected,

    #[error("No mindmap selected")]
    NoMindmapSelected,

    /// Sentinel asking the adapter to close the session
    #[error("Session closed")]
    Exit,

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl SessionError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Classification; `None` only for the [`SessionError::Exit`] sentinel
    pub fn kind(&self) -> Option<ErrorKind> {
        let kind = match self {
            SessionError::SessionNotFound(_) => ErrorKind::NotFound,
            SessionError::InvalidScope(_) => ErrorKind::InvalidScope,
            SessionError::InvalidOperation { .. } => ErrorKind::InvalidOperation,
            SessionError::InvalidArgument(_) | SessionError::NoMindmapSelected => {
                ErrorKind::InvalidArgument
            }
            SessionError::PermissionDenied(_) | SessionError::NoUserSelected => {
                ErrorKind::PermissionDenied
            }
            SessionError::Service(e) => e.kind(),
            SessionError::Backend(_) => ErrorKind::Backend,
            SessionError::Exit => return None,
        };
        Some(kind)
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, SessionError::Exit)
    }
}
