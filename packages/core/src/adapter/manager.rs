//! Adapter Manager
//!
//! Registry of adapters and the bridge from connections to sessions. Each
//! connection id is bound to one session, created on its first command and
//! removed when the session exits.

use crate::models::{Command, CommandOutput};
use crate::session::{SessionError, SessionManager};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

/// An external I/O loop producing commands
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Registry key, e.g. "stdio"
    fn kind(&self) -> &'static str;

    /// Serve until the input ends or [`Adapter::stop`] is called
    async fn run(&self, manager: Arc<AdapterManager>) -> anyhow::Result<()>;

    fn stop(&self);
}

pub struct AdapterManager {
    sessions: Arc<SessionManager>,
    adapters: RwLock<HashMap<&'static str, Arc<dyn Adapter>>>,
    connections: Mutex<HashMap<String, String>>,
}

impl AdapterManager {
    pub fn new(sessions: Arc<SessionManager>) -> Arc<Self> {
        Arc::new(Self {
            sessions,
            adapters: RwLock::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
        })
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn adapter_add(&self, adapter: Arc<dyn Adapter>) {
        let mut adapters = match self.adapters.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tracing::info!("Registered {} adapter", adapter.kind());
        adapters.insert(adapter.kind(), adapter);
    }

    /// Session bound to `connection`, created on first use
    pub async fn connection_session(&self, connection: &str) -> String {
        let mut connections = self.connections.lock().await;
        if let Some(id) = connections.get(connection) {
            return id.clone();
        }
        let id = self.sessions.session_add().await;
        connections.insert(connection.to_string(), id.clone());
        tracing::debug!("Connection '{}' bound to session {}", connection, id);
        id
    }

    /// Run `command` for `connection`
    ///
    /// The `Exit` sentinel is passed through after the session is removed.
    pub async fn command_run(
        &self,
        connection: &str,
        command: Command,
    ) -> Result<CommandOutput, SessionError> {
        let session_id = self.connection_session(connection).await;
        let result = self.sessions.session_run(&session_id, command).await;

        match &result {
            Err(SessionError::Exit) => self.connection_close(connection).await,
            Err(SessionError::SessionNotFound(_)) => {
                // Expired; the next command starts a fresh session
                self.connections.lock().await.remove(connection);
            }
            _ => {}
        }
        result
    }

    /// Forget `connection` and delete its session
    pub async fn connection_close(&self, connection: &str) {
        let session_id = self.connections.lock().await.remove(connection);
        if let Some(id) = session_id {
            if let Err(e) = self.sessions.session_delete(&id).await {
                tracing::debug!("Session of '{}' already gone: {}", connection, e);
            }
        }
    }

    /// Stop every adapter, close all connections, then the session manager
    pub async fn shutdown(&self) {
        let adapters: Vec<Arc<dyn Adapter>> = {
            let adapters = match self.adapters.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            adapters.values().cloned().collect()
        };
        for adapter in adapters {
            adapter.stop();
        }

        let connections: Vec<String> = self.connections.lock().await.keys().cloned().collect();
        for connection in connections {
            self.connection_close(&connection).await;
        }

        self.sessions.shutdown();
        tracing::info!("Adapter manager shut down");
    }
}
