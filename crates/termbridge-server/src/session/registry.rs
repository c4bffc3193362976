//! Session registry: the single source of truth for which sessions exist.
//!
//! All mutation goes through one lock, so an insert can never race past a
//! concurrent remove of the same id in a way that leaks a handle.

use super::pty::PtyHandle;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use termbridge_core::{BridgeError, BridgeResult};
use tokio::sync::RwLock;
use tracing::info;

/// Lifecycle states of one session. Transitions are monotonic:
/// `Initializing → Active → Closing → Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connection accepted, shell spawned, connected envelope not yet sent.
    Initializing,
    /// Envelopes flowing in both directions.
    Active,
    /// Termination triggered from one side, cleanup in progress.
    Closing,
    /// Both sides released; the registry no longer holds the session.
    Terminated,
}

/// One registered session: exactly one shell process, at most one transport.
pub struct Session {
    pub id: String,
    pub state: SessionState,
    pub pty: Arc<PtyHandle>,
    pub dimensions: (u16, u16),
    pub created_at: Instant,
}

impl Session {
    pub fn new(id: String, pty: Arc<PtyHandle>, cols: u16, rows: u16) -> Self {
        Self {
            id,
            state: SessionState::Initializing,
            pty,
            dimensions: (cols, rows),
            created_at: Instant::now(),
        }
    }
}

/// Table of all live sessions.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        }
    }

    /// Insert a freshly spawned session. Fails when the table is full or the
    /// id is already taken; the caller still owns the handles on failure.
    pub async fn insert(&self, session: Session) -> BridgeResult<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            return Err(BridgeError::Spawn(format!(
                "max sessions ({}) reached",
                self.max_sessions
            )));
        }
        if sessions.contains_key(&session.id) {
            return Err(BridgeError::Spawn(format!(
                "duplicate session id {}",
                session.id
            )));
        }
        info!(session_id = %session.id, "session registered");
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    /// Mark a session active once the connected envelope is on the wire.
    pub async fn activate(&self, id: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(id) {
            if session.state == SessionState::Initializing {
                session.state = SessionState::Active;
            }
        }
    }

    /// Flip a session to `Closing`. Returns true only for the first
    /// termination trigger; later triggers are no-ops.
    pub async fn begin_close(&self, id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(session)
                if !matches!(
                    session.state,
                    SessionState::Closing | SessionState::Terminated
                ) =>
            {
                session.state = SessionState::Closing;
                true
            }
            _ => false,
        }
    }

    /// Record new terminal dimensions after a resize.
    pub async fn set_dimensions(&self, id: &str, cols: u16, rows: u16) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(id) {
            session.dimensions = (cols, rows);
        }
    }

    /// Remove a terminated session. Idempotent; returns whether an entry
    /// was actually removed.
    pub async fn remove(&self, id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.remove(id) {
            Some(mut session) => {
                session.state = SessionState::Terminated;
                info!(session_id = %id, lived = ?session.created_at.elapsed(), "session removed");
                true
            }
            None => false,
        }
    }

    /// Current state of a session, if registered.
    pub async fn state(&self, id: &str) -> Option<SessionState> {
        self.sessions.read().await.get(id).map(|s| s.state)
    }

    /// Current dimensions of a session, if registered.
    pub async fn dimensions(&self, id: &str) -> Option<(u16, u16)> {
        self.sessions.read().await.get(id).map(|s| s.dimensions)
    }

    /// Whether a session is registered.
    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// Number of registered sessions.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Kill every registered session's process. Returns how many were
    /// signaled. Each owning session task observes the exit and performs
    /// its own removal.
    pub async fn terminate_all(&self) -> usize {
        let sessions = self.sessions.read().await;
        for session in sessions.values() {
            session.pty.kill();
        }
        sessions.len()
    }
}
