use clap::ArgMatches;
use tracing::{error, info};

use termhive_core::LifecycleState;

use super::helpers::{load_config_with_warning, report_supervisor_error, resolve_session, supervisor};

pub(crate) fn handle_state_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let needle = matches
        .get_one::<String>("session")
        .ok_or("Session argument is required")?;
    let state: LifecycleState = matches
        .get_one::<String>("state")
        .ok_or("State argument is required")?
        .parse()?;

    let config = load_config_with_warning();
    let supervisor = supervisor(&config);
    let session = resolve_session(&supervisor, needle)?;

    match supervisor.set_state(&session.id, state) {
        Ok(()) => {
            println!("{}: {} -> {}", session.title, session.state, state);
            info!(event = "cli.state_completed", session_id = session.id, state = %state);
            Ok(())
        }
        Err(e) => {
            report_supervisor_error(&e);
            error!(event = "cli.state_failed", session_id = session.id, error = %e);
            Err(e.into())
        }
    }
}
