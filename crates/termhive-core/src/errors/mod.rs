use std::error::Error;

/// Shared by every error enum in the workspace.
///
/// `error_code` is what goes on the wire in `error` replies, so it must stay
/// stable across releases.
pub trait TermhiveError: Error + Send + Sync + 'static {
    fn error_code(&self) -> &'static str;

    /// Caused by the caller's input; logged as a warning, not an error.
    fn is_user_error(&self) -> bool {
        false
    }
}

pub type TermhiveResult<T> = Result<T, Box<dyn TermhiveError>>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found at '{path}'")]
    ConfigNotFound { path: String },

    #[error("Failed to parse config file '{path}': {message}")]
    ConfigParseError { path: String, message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("IO error reading config: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}

impl TermhiveError for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            ConfigError::ConfigNotFound { .. } => "CONFIG_NOT_FOUND",
            ConfigError::ConfigParseError { .. } => "CONFIG_PARSE_ERROR",
            ConfigError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
            ConfigError::IoError { .. } => "CONFIG_IO_ERROR",
        }
    }

    fn is_user_error(&self) -> bool {
        matches!(
            self,
            ConfigError::ConfigParseError { .. } | ConfigError::InvalidConfiguration { .. }
        )
    }
}
