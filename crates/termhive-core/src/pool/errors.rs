use crate::daemon::SupervisorError;
use crate::errors::TermhiveError;
use crate::sessions::SessionError;

/// Failure reported by a Live Instance.
#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    #[error("Failed to serialize terminal: {message}")]
    Serialize { message: String },

    #[error("Failed to release terminal resources: {message}")]
    Cleanup { message: String },

    #[error("Failed to mount terminal: {message}")]
    Mount { message: String },
}

impl TermhiveError for InstanceError {
    fn error_code(&self) -> &'static str {
        match self {
            InstanceError::Serialize { .. } => "INSTANCE_SERIALIZE_FAILED",
            InstanceError::Cleanup { .. } => "INSTANCE_CLEANUP_FAILED",
            InstanceError::Mount { .. } => "INSTANCE_MOUNT_FAILED",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Session '{id}' is not held by the pool")]
    NotFound { id: String },

    #[error("Session '{id}' has no live instance")]
    NotLive { id: String },

    #[error("Session '{id}' is not dormant")]
    NotDormant { id: String },

    #[error("Session '{id}' already has a live instance")]
    AlreadyLive { id: String },

    #[error("Session '{id}' is dormant; restore it instead of registering a new instance")]
    AlreadyDormant { id: String },

    #[error("Eviction of '{id}' aborted: {source}")]
    SerializationFailed {
        id: String,
        #[source]
        source: InstanceError,
    },

    #[error("Restore of '{id}' failed: {source}")]
    MountFailed {
        id: String,
        #[source]
        source: InstanceError,
    },

    #[error("Terminal unavailable: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl TermhiveError for PoolError {
    fn error_code(&self) -> &'static str {
        match self {
            PoolError::NotFound { .. } => "POOL_SESSION_NOT_FOUND",
            PoolError::NotLive { .. } => "POOL_SESSION_NOT_LIVE",
            PoolError::NotDormant { .. } => "POOL_SESSION_NOT_DORMANT",
            PoolError::AlreadyLive { .. } => "POOL_SESSION_ALREADY_LIVE",
            PoolError::AlreadyDormant { .. } => "POOL_SESSION_ALREADY_DORMANT",
            PoolError::SerializationFailed { .. } => "POOL_SERIALIZATION_FAILED",
            PoolError::MountFailed { .. } => "POOL_MOUNT_FAILED",
            PoolError::Supervisor(e) => e.error_code(),
            PoolError::Session(e) => e.error_code(),
        }
    }

    fn is_user_error(&self) -> bool {
        match self {
            PoolError::NotFound { .. }
            | PoolError::NotLive { .. }
            | PoolError::NotDormant { .. } => true,
            PoolError::Supervisor(e) => e.is_user_error(),
            PoolError::Session(e) => e.is_user_error(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_failed_carries_source() {
        let error = PoolError::SerializationFailed {
            id: "s1".to_string(),
            source: InstanceError::Serialize {
                message: "renderer detached".to_string(),
            },
        };
        assert_eq!(
            error.to_string(),
            "Eviction of 's1' aborted: Failed to serialize terminal: renderer detached"
        );
        assert_eq!(error.error_code(), "POOL_SERIALIZATION_FAILED");
        assert!(!error.is_user_error());
    }

    #[test]
    fn test_supervisor_error_code_passes_through() {
        let error = PoolError::from(SupervisorError::Timeout { seconds: 10 });
        assert_eq!(error.error_code(), "SUPERVISOR_TIMEOUT");
        assert!(error.to_string().starts_with("Terminal unavailable"));
    }
}
