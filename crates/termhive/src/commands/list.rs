use clap::ArgMatches;
use tracing::{error, info};

use super::helpers::{load_config_with_warning, report_supervisor_error, supervisor};
use crate::table::TableFormatter;

pub(crate) fn handle_list_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let json_output = matches.get_flag("json");
    let project = matches.get_one::<String>("project").map(String::as_str);

    info!(event = "cli.list_started", json_output = json_output);

    let config = load_config_with_warning();
    let sessions = match supervisor(&config).list_sessions(project) {
        Ok(sessions) => sessions,
        Err(e) => {
            report_supervisor_error(&e);
            error!(event = "cli.list_failed", error = %e);
            return Err(e.into());
        }
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
    } else if sessions.is_empty() {
        println!("No sessions.");
    } else {
        TableFormatter::new(&sessions).print_table(&sessions);
    }

    info!(event = "cli.list_completed", count = sessions.len());
    Ok(())
}
