//! Process-level lifecycle events shared by the CLI and the daemon.

use tracing::{error, info, warn};

use crate::errors::TermhiveError;

/// Which termhive binary is reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Cli,
    Daemon,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Cli => "cli",
            Component::Daemon => "daemon",
        }
    }
}

pub fn log_app_startup(component: Component) {
    info!(
        event = "core.app.startup_completed",
        component = component.as_str(),
        version = env!("CARGO_PKG_VERSION"),
    );
}

pub fn log_app_shutdown(component: Component) {
    info!(
        event = "core.app.shutdown_completed",
        component = component.as_str(),
    );
}

/// Report a failure that ends the current command or process.
///
/// User errors are warnings; everything else is an error.
pub fn log_app_error<E: TermhiveError + ?Sized>(error: &E) {
    if error.is_user_error() {
        warn!(
            event = "core.app.error_occurred",
            error_code = error.error_code(),
            error = %error,
        );
    } else {
        error!(
            event = "core.app.error_occurred",
            error_code = error.error_code(),
            error = %error,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ConfigError;

    #[test]
    fn test_component_names() {
        assert_eq!(Component::Cli.as_str(), "cli");
        assert_eq!(Component::Daemon.as_str(), "daemon");
    }

    #[test]
    fn test_app_events_accept_any_termhive_error() {
        log_app_startup(Component::Daemon);
        log_app_shutdown(Component::Daemon);

        log_app_error(&ConfigError::InvalidConfiguration {
            message: "pool.max_size must be between 2 and 20, got 0".to_string(),
        });
        let boxed: Box<dyn TermhiveError> =
            Box::new(ConfigError::from(std::io::Error::other("gone")));
        log_app_error(boxed.as_ref());
    }
}
