use clap::ArgMatches;
use tracing::{error, info};

use super::helpers::{load_config_with_warning, report_supervisor_error, resolve_session, supervisor};

pub(crate) fn handle_close_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let needle = matches
        .get_one::<String>("session")
        .ok_or("Session argument is required")?;

    let config = load_config_with_warning();
    let supervisor = supervisor(&config);
    let session = resolve_session(&supervisor, needle)?;

    match supervisor.close_session(&session.id) {
        Ok(()) => {
            println!("Closed {}.", session.title);
            info!(event = "cli.close_completed", session_id = session.id);
            Ok(())
        }
        Err(e) => {
            report_supervisor_error(&e);
            error!(event = "cli.close_failed", session_id = session.id, error = %e);
            Err(e.into())
        }
    }
}
