//! Session Manager
//!
//! Owns every live session and the command pipeline:
//!
//! - `session_run` validates a command, then queues it on a bounded channel
//!   together with a oneshot reply sender
//! - a single executor task drains the channel and runs each command against
//!   its session, one at a time, so handlers never interleave
//! - a cleanup task periodically drops sessions idle longer than the timeout

use crate::models::{Command, CommandOutput};
use crate::services::DataManager;
use crate::session::error::SessionError;
use crate::session::validation::command_prepare;
use crate::session::Session;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use futures::FutureExt;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Log target of the per-command audit trail
pub const COMMAND_LOG_TARGET: &str = "mindnoscape::commands";

const SESSION_ID_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    /// How often idle sessions are looked for
    pub cleanup_interval: Duration,
    /// Idle time after which a session is dropped
    pub session_timeout: Duration,
    /// Capacity of the command queue
    pub channel_capacity: usize,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(5 * 60),
            session_timeout: Duration::from_secs(30 * 60),
            channel_capacity: 64,
        }
    }
}

type SharedSession = Arc<Mutex<Session>>;
type SessionMap = Arc<RwLock<HashMap<String, SharedSession>>>;

struct Job {
    session: SharedSession,
    command: Command,
    reply: oneshot::Sender<Result<CommandOutput, SessionError>>,
}

pub struct SessionManager {
    data: Arc<DataManager>,
    sessions: SessionMap,
    config: SessionManagerConfig,
    commands: StdMutex<Option<mpsc::Sender<Job>>>,
    cleanup: StdMutex<Option<JoinHandle<()>>>,
}

fn session_id_generate() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE.encode(bytes)
}

impl SessionManager {
    /// Start the executor and cleanup tasks; needs a tokio runtime
    pub fn new(data: Arc<DataManager>, config: SessionManagerConfig) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(config.channel_capacity.max(1));
        tokio::spawn(executor_run(receiver));

        let sessions: SessionMap = Arc::new(RwLock::new(HashMap::new()));
        let cleanup = tokio::spawn(cleanup_run(
            sessions.clone(),
            config.cleanup_interval,
            config.session_timeout,
        ));

        tracing::info!(
            "Session manager started (timeout {:?}, cleanup every {:?})",
            config.session_timeout,
            config.cleanup_interval
        );
        Arc::new(Self {
            data,
            sessions,
            config,
            commands: StdMutex::new(Some(sender)),
            cleanup: StdMutex::new(Some(cleanup)),
        })
    }

    pub fn data(&self) -> &Arc<DataManager> {
        &self.data
    }

    /// Create a session under a fresh random id
    pub async fn session_add(&self) -> String {
        let mut sessions = self.sessions.write().await;
        let id = loop {
            let candidate = session_id_generate();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        sessions.insert(
            id.clone(),
            Arc::new(Mutex::new(Session::new(id.clone(), self.data.clone()))),
        );
        tracing::info!("Session {} created", id);
        id
    }

    pub async fn session_get(&self, id: &str) -> Result<SharedSession, SessionError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::SessionNotFound(id.to_string()))
    }

    pub async fn session_delete(&self, id: &str) -> Result<(), SessionError> {
        match self.sessions.write().await.remove(id) {
            Some(_) => {
                tracing::info!("Session {} deleted", id);
                Ok(())
            }
            None => Err(SessionError::SessionNotFound(id.to_string())),
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Validate `command` and run it on the executor; waits for the result
    pub async fn session_run(
        &self,
        id: &str,
        command: Command,
    ) -> Result<CommandOutput, SessionError> {
        let session = self.session_get(id).await?;
        let command = command_prepare(command)?;

        let sender = {
            let guard = match self.commands.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.clone()
        }
        .ok_or_else(|| SessionError::backend("session manager is shut down"))?;

        let (reply, response) = oneshot::channel();
        sender
            .send(Job {
                session,
                command,
                reply,
            })
            .await
            .map_err(|_| SessionError::backend("command executor stopped"))?;

        response
            .await
            .map_err(|_| SessionError::backend("command executor dropped the reply"))?
    }

    /// Drop sessions idle longer than the timeout; returns how many went
    pub async fn session_cleanup(&self) -> usize {
        sessions_expire(&self.sessions, self.config.session_timeout).await
    }

    /// Stop the cleanup task and close the command queue
    pub fn shutdown(&self) {
        let cleanup = match self.cleanup.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = cleanup {
            handle.abort();
        }

        let sender = match self.commands.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if sender.is_some() {
            tracing::info!("Session manager shutting down");
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn executor_run(mut receiver: mpsc::Receiver<Job>) {
    while let Some(job) = receiver.recv().await {
        let Job {
            session,
            command,
            reply,
        } = job;
        let line = command.to_string();

        let run = async {
            let mut session = session.lock().await;
            let result = session.command_run(command).await;
            (session.id().to_string(), result)
        };
        let (session_id, result) = match AssertUnwindSafe(run).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!("Command '{}' panicked", line);
                (String::new(), Err(SessionError::backend("command handler panicked")))
            }
        };

        match &result {
            Ok(_) => tracing::info!(target: COMMAND_LOG_TARGET, session = %session_id, "{} -> ok", line),
            Err(e) if e.is_exit() => {
                tracing::info!(target: COMMAND_LOG_TARGET, session = %session_id, "{} -> exit", line)
            }
            Err(e) => {
                tracing::info!(target: COMMAND_LOG_TARGET, session = %session_id, "{} -> {}", line, e);
                tracing::error!("Command '{}' failed: {}", line, e);
            }
        }

        if reply.send(result).is_err() {
            tracing::debug!("Caller of '{}' went away before the reply", line);
        }
    }
    tracing::debug!("Command executor stopped");
}

async fn cleanup_run(sessions: SessionMap, interval: Duration, timeout: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // First tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let removed = sessions_expire(&sessions, timeout).await;
        if removed > 0 {
            tracing::info!("Expired {} idle session(s)", removed);
        }
    }
}

async fn sessions_expire(sessions: &SessionMap, timeout: Duration) -> usize {
    let mut sessions = sessions.write().await;
    let before = sessions.len();
    // A session that is locked is running a command and therefore not idle
    sessions.retain(|_, session| match session.try_lock() {
        Ok(session) => session.idle_for() <= timeout,
        Err(_) => true,
    });
    before - sessions.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_url_safe_and_distinct() {
        let a = session_id_generate();
        let b = session_id_generate();
        assert_ne!(a, b);
        // 32 bytes -> 44 padded base64 characters
        assert_eq!(a.len(), 44);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '='));
    }
}
