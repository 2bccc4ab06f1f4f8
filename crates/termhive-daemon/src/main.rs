use std::process::ExitCode;

use tracing::{error, info};

use termhive_core::config::{Config, TermhiveConfig};
use termhive_core::events::{self, Component};
use termhive_daemon::{DaemonConfig, run_server};

#[tokio::main]
async fn main() -> ExitCode {
    let quiet = std::env::args().any(|arg| arg == "--quiet" || arg == "-q");
    termhive_core::init_logging(quiet);
    events::log_app_startup(Component::Daemon);

    let config = match TermhiveConfig::load_hierarchy() {
        Ok(config) => config,
        Err(e) => {
            error!(event = "daemon.config.load_failed", error = %e);
            events::log_app_error(&e);
            eprintln!("termhive-daemon: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let daemon_config = DaemonConfig::from_config(&config, &Config::new());
    info!(
        event = "daemon.server.start_started",
        socket = %daemon_config.socket_path.display(),
        eviction_buffer_size = daemon_config.eviction_buffer_size,
    );

    match run_server(daemon_config).await {
        Ok(()) => {
            events::log_app_shutdown(Component::Daemon);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(event = "daemon.server.failed", error = %e);
            events::log_app_error(&e);
            eprintln!("termhive-daemon: {}", e);
            ExitCode::FAILURE
        }
    }
}
