//! Per-connection session state

use crate::models::{Command, CommandOutput, SharedMindmap, User};
use crate::services::DataManager;
use crate::session::error::SessionError;
use crate::session::handlers::{self, HandlerTable};
use crate::session::history::History;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One connection's view of the system: who is logged in, which mindmap is
/// open, and the handlers that act on them
pub struct Session {
    id: String,
    last_activity: Instant,
    pub(crate) user: Option<User>,
    pub(crate) mindmap: Option<SharedMindmap>,
    pub(crate) data: Arc<DataManager>,
    /// Node edits on the selected mindmap
    pub(crate) history: History,
    handlers: HandlerTable,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user", &self.user.as_ref().map(|u| &u.username))
            .field("mindmap", &self.mindmap.is_some())
            .finish()
    }
}

impl Session {
    pub fn new(id: String, data: Arc<DataManager>) -> Self {
        Self {
            id,
            last_activity: Instant::now(),
            user: None,
            mindmap: None,
            data,
            history: History::default(),
            handlers: handlers::table(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn mindmap(&self) -> Option<SharedMindmap> {
        self.mindmap.clone()
    }

    /// Change the selected mindmap; the edit history goes with the old one
    pub(crate) fn mindmap_set(&mut self, mindmap: Option<SharedMindmap>) {
        self.mindmap = mindmap;
        self.history.clear();
    }

    pub(crate) fn require_user(&self) -> Result<User, SessionError> {
        self.user.clone().ok_or(SessionError::NoUserSelected)
    }

    pub(crate) fn require_mindmap(&self) -> Result<SharedMindmap, SessionError> {
        self.mindmap.clone().ok_or(SessionError::NoMindmapSelected)
    }

    /// Dispatch a normalised command to its handler
    pub async fn command_run(&mut self, command: Command) -> Result<CommandOutput, SessionError> {
        self.last_activity = Instant::now();

        let operations = self
            .handlers
            .get(command.scope.as_str())
            .ok_or_else(|| SessionError::InvalidScope(command.scope.clone()))?;
        let handler = *operations
            .get(command.operation.as_str())
            .ok_or_else(|| SessionError::InvalidOperation {
                scope: command.scope.clone(),
                operation: command.operation.clone(),
            })?;

        tracing::debug!("Session {} running '{}'", self.id, command);
        handler(self, command.args).await
    }
}
