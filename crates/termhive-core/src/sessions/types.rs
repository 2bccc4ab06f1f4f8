use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::SessionError;

/// Opaque unique session token.
pub type SessionId = String;

/// What runs inside a session's PTY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// An interactive coding agent (the configured agent command).
    InteractiveAgent,
    /// The user's login shell.
    PlainShell,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::InteractiveAgent => "interactive_agent",
            SessionKind::PlainShell => "plain_shell",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            SessionKind::InteractiveAgent => "agent",
            SessionKind::PlainShell => "shell",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionKind {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interactive_agent" | "agent" => Ok(SessionKind::InteractiveAgent),
            "plain_shell" | "shell" => Ok(SessionKind::PlainShell),
            other => Err(SessionError::InvalidKind {
                kind: other.to_string(),
            }),
        }
    }
}

/// Lifecycle of a session as reported by the supervisor.
///
/// ```text
/// starting -> busy <-> {permission, question} -> done -> busy ...
/// any state -> stopped (terminal)
/// ```
///
/// `busy`, `permission` and `question` are protected: a session in one of
/// them is never chosen for eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Starting,
    Busy,
    Permission,
    Question,
    Done,
    Stopped,
}

impl LifecycleState {
    pub const ALL: [LifecycleState; 6] = [
        LifecycleState::Starting,
        LifecycleState::Busy,
        LifecycleState::Permission,
        LifecycleState::Question,
        LifecycleState::Done,
        LifecycleState::Stopped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Busy => "busy",
            LifecycleState::Permission => "permission",
            LifecycleState::Question => "question",
            LifecycleState::Done => "done",
            LifecycleState::Stopped => "stopped",
        }
    }

    /// Session needs or is receiving attention and must stay materialized.
    pub fn is_protected(&self) -> bool {
        matches!(
            self,
            LifecycleState::Busy | LifecycleState::Permission | LifecycleState::Question
        )
    }

    /// No transition leaves this state.
    pub fn is_terminal(&self) -> bool {
        *self == LifecycleState::Stopped
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Staying in the same state is always allowed except out of `stopped`,
    /// which only allows itself.
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;

        if *self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Stopped) => true,
            (Starting, Busy | Done) => true,
            (Busy, Permission | Question | Done) => true,
            (Permission | Question, Busy | Done) => true,
            (Permission, Question) | (Question, Permission) => true,
            (Done, Busy) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleState {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LifecycleState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| SessionError::InvalidState {
                state: s.to_string(),
            })
    }
}

/// Logical identity and metadata of one terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub project_id: String,
    /// `None` when the session is not inside a git worktree.
    pub worktree_id: Option<String>,
    pub kind: SessionKind,
    pub state: LifecycleState,
    pub last_activity: DateTime<Utc>,
    pub title: String,
}

impl Session {
    pub fn new(
        id: SessionId,
        project_id: String,
        worktree_id: Option<String>,
        kind: SessionKind,
    ) -> Self {
        let short_id: String = id.chars().take(8).collect();
        let title = match &worktree_id {
            Some(worktree) => format!("{} {}@{} [{}]", kind.label(), project_id, worktree, short_id),
            None => format!("{} {} [{}]", kind.label(), project_id, short_id),
        };
        Self {
            id,
            project_id,
            worktree_id,
            kind,
            state: LifecycleState::Starting,
            last_activity: Utc::now(),
            title,
        }
    }
}
