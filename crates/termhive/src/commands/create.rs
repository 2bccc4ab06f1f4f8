use std::path::PathBuf;

use clap::ArgMatches;
use tracing::{error, info};

use termhive_core::SessionKind;
use termhive_core::daemon::CreateSessionRequest;
use termhive_core::events;

use super::helpers::{load_config_with_warning, report_supervisor_error, supervisor};
use crate::table::short_id;

pub(crate) fn handle_create_command(
    matches: &ArgMatches,
) -> Result<(), Box<dyn std::error::Error>> {
    let project = matches
        .get_one::<String>("project")
        .ok_or("Project argument is required")?;
    let kind = if matches.get_flag("shell") {
        SessionKind::PlainShell
    } else {
        SessionKind::InteractiveAgent
    };
    let working_directory = match matches.get_one::<String>("cwd") {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir()?,
    };

    let config = load_config_with_warning();
    let supervisor = supervisor(&config);

    let mut request = CreateSessionRequest::new(project, kind, working_directory);
    request.worktree_id = matches.get_one::<String>("worktree").cloned();
    request.title = matches.get_one::<String>("title").cloned();

    info!(
        event = "cli.create_started",
        project_id = project,
        kind = %kind,
    );

    match supervisor.create_session(&request) {
        Ok(session) => {
            println!("Created session {}", session.id);
            println!("  Title: {}", session.title);
            println!("  State: {}", session.state);
            if let Some(pid) = session.pid {
                println!("  PID:   {}", pid);
            }
            info!(
                event = "cli.create_completed",
                session_id = session.id,
                short_id = short_id(&session.id),
            );
            Ok(())
        }
        Err(e) => {
            report_supervisor_error(&e);
            error!(event = "cli.create_failed", project_id = project, error = %e);
            events::log_app_error(&e);
            Err(e.into())
        }
    }
}
