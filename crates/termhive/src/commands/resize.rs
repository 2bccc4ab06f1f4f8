use clap::ArgMatches;
use tracing::{error, info};

use super::helpers::{load_config_with_warning, report_supervisor_error, resolve_session, supervisor};

pub(crate) fn handle_resize_command(
    matches: &ArgMatches,
) -> Result<(), Box<dyn std::error::Error>> {
    let needle = matches
        .get_one::<String>("session")
        .ok_or("Session argument is required")?;
    let cols = *matches
        .get_one::<u16>("cols")
        .ok_or("Cols argument is required")?;
    let rows = *matches
        .get_one::<u16>("rows")
        .ok_or("Rows argument is required")?;

    let config = load_config_with_warning();
    let supervisor = supervisor(&config);
    let session = resolve_session(&supervisor, needle)?;

    match supervisor.resize(&session.id, rows, cols) {
        Ok(()) => {
            info!(
                event = "cli.resize_completed",
                session_id = session.id,
                cols = cols,
                rows = rows,
            );
            println!("Resized {} to {}x{}.", session.title, cols, rows);
            Ok(())
        }
        Err(e) => {
            report_supervisor_error(&e);
            error!(event = "cli.resize_failed", session_id = session.id, error = %e);
            Err(e.into())
        }
    }
}
