//! Authoritative metadata store for sessions.
//!
//! Pure data: no I/O and no events. The daemon owns the authoritative copy;
//! the UI side keeps a mirror updated from supervisor events.

use std::collections::HashMap;

use chrono::Utc;
use tracing::debug;

use super::errors::SessionError;
use super::types::{LifecycleState, Session, SessionId, SessionKind};

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session in `starting` with a fresh id.
    pub fn create(
        &mut self,
        project_id: &str,
        worktree_id: Option<&str>,
        kind: SessionKind,
    ) -> Result<SessionId, SessionError> {
        if project_id.trim().is_empty() {
            return Err(SessionError::EmptyProjectId);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let session = Session::new(
            id.clone(),
            project_id.to_string(),
            worktree_id.map(String::from),
            kind,
        );
        self.sessions.insert(id.clone(), session);

        debug!(
            event = "core.registry.session_created",
            session_id = id,
            project_id = project_id,
            kind = %kind,
        );
        Ok(id)
    }

    /// Insert a session that was created elsewhere (mirror of the daemon).
    pub fn insert(&mut self, session: Session) -> Result<(), SessionError> {
        if self.sessions.contains_key(&session.id) {
            return Err(SessionError::AlreadyExists { id: session.id });
        }
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    /// Insert or overwrite a session record.
    pub fn upsert(&mut self, session: Session) {
        self.sessions.insert(session.id.clone(), session);
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn state_of(&self, id: &str) -> Option<LifecycleState> {
        self.sessions.get(id).map(|s| s.state)
    }

    /// Move a session to `new_state`, validated by the state machine.
    ///
    /// Returns the previous state. Re-entering the current state only
    /// refreshes `last_activity`.
    pub fn set_state(
        &mut self,
        id: &str,
        new_state: LifecycleState,
    ) -> Result<LifecycleState, SessionError> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound { id: id.to_string() })?;

        let previous = session.state;
        if !previous.can_transition_to(new_state) {
            return Err(SessionError::InvalidTransition {
                id: id.to_string(),
                from: previous,
                to: new_state,
            });
        }

        session.state = new_state;
        session.last_activity = Utc::now();

        if previous != new_state {
            debug!(
                event = "core.registry.state_changed",
                session_id = id,
                from = %previous,
                to = %new_state,
            );
        }
        Ok(previous)
    }

    pub fn set_title(&mut self, id: &str, title: &str) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound { id: id.to_string() })?;
        session.title = title.to_string();
        Ok(())
    }

    pub fn record_activity(&mut self, id: &str) {
        if let Some(session) = self.sessions.get_mut(id) {
            session.last_activity = Utc::now();
        }
    }

    /// Remove a session. Unknown ids are a no-op.
    pub fn remove(&mut self, id: &str) -> Option<Session> {
        self.sessions.remove(id)
    }

    pub fn list(&self) -> Vec<&Session> {
        let mut sessions: Vec<&Session> = self.sessions.values().collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        sessions
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
