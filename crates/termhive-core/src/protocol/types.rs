use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sessions::{LifecycleState, Session, SessionKind};

/// Supervisor view of one session, as sent over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree_id: Option<String>,
    pub kind: SessionKind,
    pub state: LifecycleState,
    pub title: String,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// True while the supervisor buffers instead of emitting output.
    #[serde(default)]
    pub dormant: bool,
    #[serde(default)]
    pub buffered_bytes: usize,
    #[serde(default)]
    pub client_count: usize,
}

impl SessionInfo {
    /// Registry record for the UI-side mirror.
    pub fn to_session(&self) -> Session {
        Session {
            id: self.id.clone(),
            project_id: self.project_id.clone(),
            worktree_id: self.worktree_id.clone(),
            kind: self.kind,
            state: self.state,
            last_activity: self.last_activity,
            title: self.title.clone(),
        }
    }
}

/// Decoded push message from a streaming connection.
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    Data {
        session_id: String,
        bytes: Vec<u8>,
    },
    OutputDropped {
        session_id: String,
        chunks_dropped: u64,
    },
    /// Events were missed; rebuild the local view from `list_sessions`.
    Resync {
        events_dropped: u64,
    },
    StateChanged {
        session_id: String,
        state: LifecycleState,
    },
    Exited {
        session_id: String,
        exit_code: Option<i32>,
    },
}

impl SupervisorEvent {
    /// `None` for events that concern the whole session set.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            SupervisorEvent::Data { session_id, .. }
            | SupervisorEvent::OutputDropped { session_id, .. }
            | SupervisorEvent::StateChanged { session_id, .. }
            | SupervisorEvent::Exited { session_id, .. } => Some(session_id),
            SupervisorEvent::Resync { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_info_to_session() {
        let now = Utc::now();
        let info = SessionInfo {
            id: "s1".to_string(),
            project_id: "webapp".to_string(),
            worktree_id: None,
            kind: SessionKind::PlainShell,
            state: LifecycleState::Done,
            title: "shell webapp".to_string(),
            last_activity: now,
            created_at: now,
            pid: Some(42),
            dormant: true,
            buffered_bytes: 10,
            client_count: 0,
        };
        let session = info.to_session();
        assert_eq!(session.id, "s1");
        assert_eq!(session.state, LifecycleState::Done);
        assert_eq!(session.last_activity, now);
    }

    #[test]
    fn test_session_info_tolerates_missing_optional_fields() {
        let json = r#"{
            "id": "s1",
            "project_id": "p",
            "kind": "interactive_agent",
            "state": "busy",
            "title": "agent p",
            "last_activity": "2024-01-01T00:00:00Z",
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let info: SessionInfo = serde_json::from_str(json).unwrap();
        assert!(!info.dormant);
        assert_eq!(info.buffered_bytes, 0);
        assert!(info.pid.is_none());
    }
}
