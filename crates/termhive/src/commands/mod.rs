use clap::ArgMatches;
use tracing::error;

use termhive_core::events::{self, Component};

pub mod helpers;

mod close;
mod completions;
mod console;
mod create;
mod daemon;
mod list;
mod resize;
mod send;
mod state;

pub fn run_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    events::log_app_startup(Component::Cli);

    match matches.subcommand() {
        Some(("daemon", sub_matches)) => daemon::handle_daemon_command(sub_matches),
        Some(("create", sub_matches)) => create::handle_create_command(sub_matches),
        Some(("list", sub_matches)) => list::handle_list_command(sub_matches),
        Some(("send", sub_matches)) => send::handle_send_command(sub_matches),
        Some(("resize", sub_matches)) => resize::handle_resize_command(sub_matches),
        Some(("state", sub_matches)) => state::handle_state_command(sub_matches),
        Some(("close", sub_matches)) => close::handle_close_command(sub_matches),
        Some(("console", sub_matches)) => console::handle_console_command(sub_matches),
        Some(("completions", sub_matches)) => {
            completions::handle_completions_command(sub_matches)
        }
        _ => {
            error!(event = "cli.command_unknown");
            Err("Unknown command".into())
        }
    }
}
