use crate::errors::TermhiveError;

/// Error talking to the PTY supervisor.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Daemon is not running (socket not found at {path})")]
    NotRunning { path: String },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Daemon did not answer within {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Daemon has no session '{id}'")]
    SessionNotFound { id: String },

    #[error("Daemon returned error [{code}]: {message}")]
    DaemonError { code: String, message: String },

    #[error("IPC protocol error: {message}")]
    ProtocolError { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    /// The daemon could not be reached, as opposed to rejecting the request.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            SupervisorError::NotRunning { .. }
                | SupervisorError::ConnectionFailed { .. }
                | SupervisorError::Timeout { .. }
                | SupervisorError::Io(_)
        )
    }
}

impl TermhiveError for SupervisorError {
    fn error_code(&self) -> &'static str {
        match self {
            SupervisorError::NotRunning { .. } => "SUPERVISOR_NOT_RUNNING",
            SupervisorError::ConnectionFailed { .. } => "SUPERVISOR_CONNECTION_FAILED",
            SupervisorError::Timeout { .. } => "SUPERVISOR_TIMEOUT",
            SupervisorError::SessionNotFound { .. } => "SUPERVISOR_SESSION_NOT_FOUND",
            SupervisorError::DaemonError { .. } => "SUPERVISOR_ERROR",
            SupervisorError::ProtocolError { .. } => "SUPERVISOR_PROTOCOL_ERROR",
            SupervisorError::Io(_) => "SUPERVISOR_IO_ERROR",
        }
    }

    fn is_user_error(&self) -> bool {
        matches!(
            self,
            SupervisorError::NotRunning { .. } | SupervisorError::SessionNotFound { .. }
        )
    }
}
