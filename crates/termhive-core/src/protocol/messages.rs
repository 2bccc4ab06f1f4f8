use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::types::SessionInfo;
use crate::sessions::{LifecycleState, SessionKind};

/// Client -> Daemon request messages.
///
/// Each variant maps to a JSONL message with `"type"` as the tag field.
/// All requests carry an `id` field for response correlation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Register a session and spawn its PTY.
    #[serde(rename = "create_session")]
    CreateSession {
        id: String,
        project_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        worktree_id: Option<String>,
        kind: SessionKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        /// Working directory for the PTY process.
        working_directory: String,
        /// Overrides the configured agent command / login shell.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env_vars: HashMap<String, String>,
        #[serde(default = "default_rows")]
        rows: u16,
        #[serde(default = "default_cols")]
        cols: u16,
    },

    /// Subscribe this connection to a live session's output.
    #[serde(rename = "attach")]
    Attach { id: String, session_id: String },

    #[serde(rename = "write_stdin")]
    WriteStdin {
        id: String,
        session_id: String,
        /// Base64-encoded bytes to write to PTY stdin.
        data: String,
    },

    #[serde(rename = "resize_pty")]
    ResizePty {
        id: String,
        session_id: String,
        rows: u16,
        cols: u16,
    },

    /// Terminate the PTY and release all per-session state.
    #[serde(rename = "close_session")]
    CloseSession { id: String, session_id: String },

    /// Start buffering output instead of emitting it.
    #[serde(rename = "evict_session")]
    EvictSession { id: String, session_id: String },

    /// Subscribe this connection, then flush and clear the buffer.
    /// The connection streams live output afterwards.
    #[serde(rename = "restore_session")]
    RestoreSession { id: String, session_id: String },

    #[serde(rename = "set_state")]
    SetState {
        id: String,
        session_id: String,
        state: LifecycleState,
    },

    #[serde(rename = "list_sessions")]
    ListSessions {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project_id: Option<String>,
    },

    #[serde(rename = "get_session")]
    GetSession { id: String, session_id: String },

    /// Subscribe this connection to state-change and exit events.
    #[serde(rename = "subscribe_events")]
    SubscribeEvents { id: String },

    #[serde(rename = "daemon_stop")]
    DaemonStop { id: String },

    #[serde(rename = "ping")]
    Ping { id: String },
}

/// Daemon -> Client response and streaming messages.
///
/// Response messages echo the request `id`. Streaming messages have no `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DaemonMessage {
    #[serde(rename = "session_created")]
    SessionCreated { id: String, session: SessionInfo },

    /// Bytes buffered while the session was dormant.
    #[serde(rename = "restored")]
    Restored {
        id: String,
        session_id: String,
        /// Base64-encoded flushed bytes.
        data: String,
    },

    /// Streaming PTY output. No `id`.
    #[serde(rename = "pty_output")]
    PtyOutput {
        session_id: String,
        /// Base64-encoded raw PTY output bytes.
        data: String,
    },

    /// A slow subscriber missed this many output chunks.
    #[serde(rename = "pty_output_dropped")]
    PtyOutputDropped {
        session_id: String,
        chunks_dropped: u64,
    },

    /// A slow event subscriber missed events; its view needs a resync.
    #[serde(rename = "events_lagged")]
    EventsLagged { events_dropped: u64 },

    #[serde(rename = "state_changed")]
    StateChanged {
        session_id: String,
        state: LifecycleState,
    },

    #[serde(rename = "session_exited")]
    SessionExited {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },

    #[serde(rename = "session_list")]
    SessionList {
        id: String,
        sessions: Vec<SessionInfo>,
    },

    #[serde(rename = "session_info")]
    SessionInfo { id: String, session: SessionInfo },

    #[serde(rename = "error")]
    Error {
        id: String,
        code: String,
        message: String,
    },

    #[serde(rename = "ack")]
    Ack { id: String },
}

fn default_rows() -> u16 {
    24
}

fn default_cols() -> u16 {
    80
}

impl ClientMessage {
    /// Extract the request ID from any client message.
    pub fn id(&self) -> &str {
        match self {
            ClientMessage::CreateSession { id, .. }
            | ClientMessage::Attach { id, .. }
            | ClientMessage::WriteStdin { id, .. }
            | ClientMessage::ResizePty { id, .. }
            | ClientMessage::CloseSession { id, .. }
            | ClientMessage::EvictSession { id, .. }
            | ClientMessage::RestoreSession { id, .. }
            | ClientMessage::SetState { id, .. }
            | ClientMessage::ListSessions { id, .. }
            | ClientMessage::GetSession { id, .. }
            | ClientMessage::SubscribeEvents { id }
            | ClientMessage::DaemonStop { id }
            | ClientMessage::Ping { id } => id,
        }
    }
}

impl DaemonMessage {
    /// Request id of a reply; `None` for streamed output and events.
    pub fn reply_id(&self) -> Option<&str> {
        match self {
            DaemonMessage::SessionCreated { id, .. }
            | DaemonMessage::Restored { id, .. }
            | DaemonMessage::SessionList { id, .. }
            | DaemonMessage::SessionInfo { id, .. }
            | DaemonMessage::Error { id, .. }
            | DaemonMessage::Ack { id } => Some(id),
            DaemonMessage::PtyOutput { .. }
            | DaemonMessage::PtyOutputDropped { .. }
            | DaemonMessage::EventsLagged { .. }
            | DaemonMessage::StateChanged { .. }
            | DaemonMessage::SessionExited { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_session_wire_format() {
        let msg = ClientMessage::CreateSession {
            id: "req-1".to_string(),
            project_id: "webapp".to_string(),
            worktree_id: Some("feature-auth".to_string()),
            kind: SessionKind::InteractiveAgent,
            title: None,
            working_directory: "/tmp/webapp".to_string(),
            command: None,
            args: vec![],
            env_vars: HashMap::new(),
            rows: 24,
            cols: 80,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"create_session""#));
        assert!(json.contains(r#""kind":"interactive_agent""#));
        assert!(!json.contains("title"), "absent title should be skipped");
    }

    #[test]
    fn test_create_session_defaults_dimensions() {
        let json = r#"{"type":"create_session","id":"r","project_id":"p","kind":"plain_shell","working_directory":"/tmp"}"#;
        match serde_json::from_str::<ClientMessage>(json).unwrap() {
            ClientMessage::CreateSession { rows, cols, args, .. } => {
                assert_eq!((rows, cols), (24, 80));
                assert!(args.is_empty());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_set_state_uses_snake_case_state() {
        let msg = ClientMessage::SetState {
            id: "req-9".to_string(),
            session_id: "s1".to_string(),
            state: LifecycleState::Permission,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""state":"permission""#));
        let parsed: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id(), "req-9");
    }

    #[test]
    fn test_session_exited_without_code() {
        let json = r#"{"type":"session_exited","session_id":"s1"}"#;
        match serde_json::from_str::<DaemonMessage>(json).unwrap() {
            DaemonMessage::SessionExited { exit_code, .. } => assert!(exit_code.is_none()),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let json = r#"{"type":"teleport","id":"r"}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn test_output_dropped_counts_chunks() {
        let msg = DaemonMessage::PtyOutputDropped {
            session_id: "s1".to_string(),
            chunks_dropped: 3,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""chunks_dropped":3"#));
        assert!(!json.contains("bytes_dropped"));
    }

    #[test]
    fn test_events_lagged_is_a_push() {
        let json = r#"{"type":"events_lagged","events_dropped":12}"#;
        let msg: DaemonMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, DaemonMessage::EventsLagged { events_dropped: 12 }));
        assert_eq!(msg.reply_id(), None);
    }

    #[test]
    fn test_reply_id_only_on_replies() {
        let ack = DaemonMessage::Ack { id: "req-3".to_string() };
        assert_eq!(ack.reply_id(), Some("req-3"));

        let output = DaemonMessage::PtyOutput {
            session_id: "s1".to_string(),
            data: String::new(),
        };
        assert_eq!(output.reply_id(), None);
    }
}
