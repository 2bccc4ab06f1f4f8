use crate::errors::TermhiveError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session '{id}' not found")]
    NotFound { id: String },

    #[error("Session '{id}' already exists")]
    AlreadyExists { id: String },

    #[error("Invalid project id: cannot be empty")]
    EmptyProjectId,

    #[error("Invalid lifecycle transition for '{id}': {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: super::types::LifecycleState,
        to: super::types::LifecycleState,
    },

    #[error(
        "Invalid lifecycle state: '{state}'. Valid: starting, busy, permission, question, done, stopped"
    )]
    InvalidState { state: String },

    #[error("Invalid session kind: '{kind}'. Valid: interactive_agent, plain_shell")]
    InvalidKind { kind: String },
}

impl TermhiveError for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            SessionError::NotFound { .. } => "SESSION_NOT_FOUND",
            SessionError::AlreadyExists { .. } => "SESSION_ALREADY_EXISTS",
            SessionError::EmptyProjectId => "INVALID_PROJECT_ID",
            SessionError::InvalidTransition { .. } => "INVALID_TRANSITION",
            SessionError::InvalidState { .. } => "INVALID_STATE",
            SessionError::InvalidKind { .. } => "INVALID_SESSION_KIND",
        }
    }

    fn is_user_error(&self) -> bool {
        !matches!(self, SessionError::InvalidTransition { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::types::LifecycleState;

    #[test]
    fn test_session_error_display() {
        let error = SessionError::NotFound {
            id: "abc".to_string(),
        };
        assert_eq!(error.to_string(), "Session 'abc' not found");
        assert_eq!(error.error_code(), "SESSION_NOT_FOUND");
        assert!(error.is_user_error());
    }

    #[test]
    fn test_invalid_transition_display() {
        let error = SessionError::InvalidTransition {
            id: "abc".to_string(),
            from: LifecycleState::Stopped,
            to: LifecycleState::Busy,
        };
        assert_eq!(
            error.to_string(),
            "Invalid lifecycle transition for 'abc': stopped -> busy"
        );
        assert!(!error.is_user_error());
    }
}
