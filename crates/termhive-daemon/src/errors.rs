use termhive_core::errors::TermhiveError;
use termhive_core::sessions::SessionError;

/// Daemon-side errors. `error_code` is the string sent on the wire.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session already exists: {0}")]
    SessionAlreadyExists(String),

    #[error("Session is dormant: {0}")]
    SessionDormant(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("PTY error: {0}")]
    PtyError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Daemon is not running")]
    NotRunning,

    #[error("Daemon already running (pid {0})")]
    AlreadyRunning(i32),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TermhiveError for DaemonError {
    fn error_code(&self) -> &'static str {
        match self {
            DaemonError::SessionNotFound(_) => "session_not_found",
            DaemonError::SessionAlreadyExists(_) => "session_already_exists",
            DaemonError::SessionDormant(_) => "session_dormant",
            DaemonError::InvalidRequest(_) => "invalid_request",
            DaemonError::Session(SessionError::NotFound { .. }) => "session_not_found",
            DaemonError::Session(SessionError::InvalidTransition { .. }) => "invalid_transition",
            DaemonError::Session(_) => "invalid_request",
            DaemonError::PtyError(_) => "pty_error",
            DaemonError::ProtocolError(_) => "protocol_error",
            DaemonError::NotRunning => "not_running",
            DaemonError::AlreadyRunning(_) => "already_running",
            DaemonError::ConnectionFailed(_) => "connection_failed",
            DaemonError::Io(_) => "io_error",
            DaemonError::Serialization(_) => "serialization_error",
        }
    }

    fn is_user_error(&self) -> bool {
        matches!(
            self,
            DaemonError::SessionNotFound(_)
                | DaemonError::SessionAlreadyExists(_)
                | DaemonError::SessionDormant(_)
                | DaemonError::InvalidRequest(_)
                | DaemonError::NotRunning
                | DaemonError::AlreadyRunning(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termhive_core::LifecycleState;

    #[test]
    fn test_wire_codes_are_snake_case() {
        assert_eq!(
            DaemonError::SessionNotFound("s1".to_string()).error_code(),
            "session_not_found"
        );
        assert_eq!(DaemonError::PtyError("x".to_string()).error_code(), "pty_error");
    }

    #[test]
    fn test_registry_errors_map_to_wire_codes() {
        let missing = DaemonError::from(SessionError::NotFound {
            id: "s1".to_string(),
        });
        assert_eq!(missing.error_code(), "session_not_found");

        let bad_move = DaemonError::from(SessionError::InvalidTransition {
            id: "s1".to_string(),
            from: LifecycleState::Stopped,
            to: LifecycleState::Busy,
        });
        assert_eq!(bad_move.error_code(), "invalid_transition");
        assert!(!bad_move.is_user_error());
    }
}
