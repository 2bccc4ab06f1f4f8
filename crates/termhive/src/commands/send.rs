use clap::ArgMatches;
use tracing::{error, info};

use super::helpers::{load_config_with_warning, report_supervisor_error, resolve_session, supervisor};

pub(crate) fn handle_send_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let needle = matches
        .get_one::<String>("session")
        .ok_or("Session argument is required")?;
    let text = matches
        .get_one::<String>("text")
        .ok_or("Text argument is required")?;

    let config = load_config_with_warning();
    let supervisor = supervisor(&config);
    let session = resolve_session(&supervisor, needle)?;

    let mut bytes = text.as_bytes().to_vec();
    bytes.push(b'\r');

    match supervisor.write_stdin(&session.id, &bytes) {
        Ok(()) => {
            info!(event = "cli.send_completed", session_id = session.id, bytes = bytes.len());
            if session.dormant {
                println!("Sent to {} (dormant; output is buffered).", session.title);
            } else {
                println!("Sent to {}.", session.title);
            }
            Ok(())
        }
        Err(e) => {
            report_supervisor_error(&e);
            error!(event = "cli.send_failed", session_id = session.id, error = %e);
            Err(e.into())
        }
    }
}
