use termhive_core::config::{Config, TermhiveConfig};
use termhive_core::{DaemonSupervisor, SessionInfo, SupervisorError};

/// Load the config hierarchy, falling back to defaults with a warning.
pub fn load_config_with_warning() -> TermhiveConfig {
    match TermhiveConfig::load_hierarchy() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config: {}. Using defaults.", e);
            eprintln!(
                "Tip: Check ~/.termhive/config.toml and ./.termhive/config.toml for syntax errors."
            );
            tracing::warn!(event = "cli.config.load_failed", error = %e);
            TermhiveConfig::default()
        }
    }
}

pub fn supervisor(config: &TermhiveConfig) -> DaemonSupervisor {
    DaemonSupervisor::from_config(config, &Config::new())
}

/// Print a user-facing explanation for a supervisor failure.
pub fn report_supervisor_error(e: &SupervisorError) {
    if e.is_unavailable() {
        eprintln!("Error: terminal unavailable: {}", e);
        eprintln!("Tip: Start the daemon with 'termhive daemon start'.");
    } else {
        eprintln!("Error: {}", e);
    }
}

/// Match a full id or a unique id prefix.
pub fn match_id<'a, I>(ids: I, needle: &str) -> Result<&'a str, String>
where
    I: IntoIterator<Item = &'a str>,
{
    let ids: Vec<&str> = ids.into_iter().collect();
    if let Some(exact) = ids.iter().find(|id| **id == needle) {
        return Ok(*exact);
    }

    let matches: Vec<&str> = ids.into_iter().filter(|id| id.starts_with(needle)).collect();
    match matches.as_slice() {
        [only] => Ok(*only),
        [] => Err(format!("No session matches '{}'", needle)),
        many => Err(format!(
            "'{}' is ambiguous: matches {} sessions",
            needle,
            many.len()
        )),
    }
}

/// Find a session by full id or unique id prefix.
pub fn find_session<'a>(
    sessions: &'a [SessionInfo],
    needle: &str,
) -> Result<&'a SessionInfo, String> {
    let id = match_id(sessions.iter().map(|s| s.id.as_str()), needle)?;
    sessions
        .iter()
        .find(|s| s.id == id)
        .ok_or_else(|| format!("No session matches '{}'", needle))
}

/// Resolve a session argument against the daemon's current list.
pub fn resolve_session(
    supervisor: &DaemonSupervisor,
    needle: &str,
) -> Result<SessionInfo, Box<dyn std::error::Error>> {
    let sessions = supervisor.list_sessions(None).map_err(|e| {
        report_supervisor_error(&e);
        e
    })?;
    match find_session(&sessions, needle) {
        Ok(session) => Ok(session.clone()),
        Err(msg) => {
            eprintln!("Error: {}", msg);
            eprintln!("Tip: Use 'termhive list' to see sessions.");
            Err(msg.into())
        }
    }
}
