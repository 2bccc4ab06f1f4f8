use std::fs::OpenOptions;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use clap::ArgMatches;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::{error, info, warn};

use termhive_core::config::Config;
use termhive_core::{DaemonSupervisor, SupervisorError};

use super::helpers::{load_config_with_warning, report_supervisor_error, supervisor};

const START_POLL_ATTEMPTS: u32 = 50;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub(crate) fn handle_daemon_command(
    matches: &ArgMatches,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config_with_warning();
    let supervisor = supervisor(&config);
    let runtime = Config::new();

    match matches.subcommand() {
        Some(("start", _)) => start_daemon(&supervisor, &runtime),
        Some(("stop", _)) => stop_daemon(&supervisor),
        Some(("status", _)) => {
            print_status(&supervisor, &runtime);
            Ok(())
        }
        _ => Err("Unknown daemon command".into()),
    }
}

fn start_daemon(
    supervisor: &DaemonSupervisor,
    runtime: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    if supervisor.ping().is_ok() {
        println!("Daemon already running.");
        return Ok(());
    }

    info!(event = "cli.daemon.start_started");
    std::fs::create_dir_all(&runtime.termhive_dir)?;
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(runtime.termhive_dir.join("daemon.log"))?;

    let binary = daemon_binary();
    let child = Command::new(&binary)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(log))
        .process_group(0)
        .spawn()
        .map_err(|e| {
            eprintln!("Error: could not launch '{}': {}", binary.display(), e);
            error!(event = "cli.daemon.start_failed", binary = %binary.display(), error = %e);
            e
        })?;

    for _ in 0..START_POLL_ATTEMPTS {
        if supervisor.ping().is_ok() {
            println!("Daemon started (pid {}).", child.id());
            info!(event = "cli.daemon.start_completed", pid = child.id());
            return Ok(());
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    eprintln!(
        "Error: daemon did not come up. See {}",
        runtime.termhive_dir.join("daemon.log").display()
    );
    error!(event = "cli.daemon.start_timeout", pid = child.id());
    Err("Daemon did not start".into())
}

/// The daemon binary next to this executable, else whatever is on PATH.
fn daemon_binary() -> PathBuf {
    std::env::current_exe()
        .ok()
        .map(|exe| exe.with_file_name("termhive-daemon"))
        .filter(|candidate| candidate.exists())
        .unwrap_or_else(|| PathBuf::from("termhive-daemon"))
}

fn stop_daemon(supervisor: &DaemonSupervisor) -> Result<(), Box<dyn std::error::Error>> {
    match supervisor.stop_daemon() {
        Ok(()) => {
            for _ in 0..START_POLL_ATTEMPTS {
                if !supervisor.socket_path().exists() {
                    break;
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            println!("Daemon stopped.");
            info!(event = "cli.daemon.stop_completed");
            Ok(())
        }
        Err(SupervisorError::NotRunning { .. }) => {
            println!("Daemon is not running.");
            Ok(())
        }
        Err(e) => {
            report_supervisor_error(&e);
            Err(e.into())
        }
    }
}

fn print_status(supervisor: &DaemonSupervisor, runtime: &Config) {
    let pid = read_pid(&runtime.pid_path());
    let alive = pid.is_some_and(process_alive);

    match supervisor.list_sessions(None) {
        Ok(sessions) => {
            let dormant = sessions.iter().filter(|s| s.dormant).count();
            match pid {
                Some(pid) => println!("Daemon: running (pid {})", pid),
                None => println!("Daemon: running"),
            }
            println!("Socket: {}", supervisor.socket_path().display());
            println!("Sessions: {} ({} dormant)", sessions.len(), dormant);
        }
        Err(e) => {
            if alive {
                warn!(event = "cli.daemon.unresponsive", pid = ?pid, error = %e);
                println!("Daemon: not responding (pid {:?} is alive): {}", pid, e);
            } else {
                println!("Daemon: not running");
                if pid.is_some() {
                    println!("Note: stale pid file at {}", runtime.pid_path().display());
                }
            }
        }
    }
}

fn read_pid(path: &Path) -> Option<i32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Signal 0 checks that the process exists without delivering anything.
fn process_alive(pid: i32) -> bool {
    kill(Pid::from_raw(pid), None).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_pid_missing_or_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        assert_eq!(read_pid(&path), None);
        std::fs::write(&path, "not a pid").unwrap();
        assert_eq!(read_pid(&path), None);
        std::fs::write(&path, "123\n").unwrap();
        assert_eq!(read_pid(&path), Some(123));
    }

    #[test]
    fn test_process_alive_for_self() {
        assert!(process_alive(std::process::id() as i32));
    }
}
