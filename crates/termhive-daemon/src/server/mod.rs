//! Unix socket server: socket lifecycle, accept loop and PTY exit handling.

pub mod connection;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::DaemonError;
use crate::pty::output::PtyExitEvent;
use crate::session::manager::SessionManager;
use crate::types::DaemonConfig;

/// Run the daemon until a signal or a `daemon_stop` request.
pub async fn run_server(config: DaemonConfig) -> Result<(), DaemonError> {
    run_server_with_shutdown(config, CancellationToken::new()).await
}

/// Like [`run_server`], but also stops when `shutdown` is cancelled.
pub async fn run_server_with_shutdown(
    config: DaemonConfig,
    shutdown: CancellationToken,
) -> Result<(), DaemonError> {
    prepare_socket_path(&config).await?;

    let listener = UnixListener::bind(&config.socket_path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&config.socket_path, std::fs::Permissions::from_mode(0o600))?;
    }
    write_pid_file(&config.pid_path)?;

    info!(
        event = "daemon.server.start_completed",
        socket = %config.socket_path.display(),
        pid = std::process::id(),
    );

    let (exit_tx, exit_rx) = mpsc::unbounded_channel::<PtyExitEvent>();
    let session_manager = Arc::new(Mutex::new(SessionManager::new(config.clone(), exit_tx)));

    spawn_signal_handler(shutdown.clone());
    let exit_task = tokio::spawn(handle_pty_exits(
        exit_rx,
        Arc::clone(&session_manager),
        shutdown.clone(),
    ));

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let mgr = Arc::clone(&session_manager);
                        let token = shutdown.clone();
                        tokio::spawn(async move {
                            connection::handle_connection(stream, mgr, token).await;
                        });
                    }
                    Err(e) => {
                        error!(event = "daemon.server.accept_failed", error = %e);
                    }
                }
            }
            _ = shutdown.cancelled() => {
                info!(event = "daemon.server.shutdown_started");
                break;
            }
        }
    }

    {
        let mut mgr = session_manager.lock().await;
        mgr.stop_all();
    }
    let grace = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(grace, exit_task).await.is_err() {
        warn!(event = "daemon.server.exit_task_timeout");
    }

    remove_quietly(&config.pid_path);
    remove_quietly(&config.socket_path);
    info!(event = "daemon.server.shutdown_completed");
    Ok(())
}

/// Refuse to start over a live daemon; clear a stale socket left by a dead one.
async fn prepare_socket_path(config: &DaemonConfig) -> Result<(), DaemonError> {
    if let Some(parent) = config.socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if let Some(parent) = config.pid_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if config.socket_path.exists() {
        if UnixStream::connect(&config.socket_path).await.is_ok() {
            let pid = read_pid_file(&config.pid_path).unwrap_or(0);
            return Err(DaemonError::AlreadyRunning(pid));
        }
        warn!(
            event = "daemon.server.stale_socket_removed",
            socket = %config.socket_path.display(),
        );
        std::fs::remove_file(&config.socket_path)?;
    }
    Ok(())
}

fn write_pid_file(path: &Path) -> Result<(), DaemonError> {
    std::fs::write(path, std::process::id().to_string())?;
    Ok(())
}

/// Pid recorded by a running daemon, if any.
pub fn read_pid_file(path: &Path) -> Option<i32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(
            event = "daemon.server.cleanup_failed",
            path = %path.display(),
            error = %e,
        );
    }
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    warn!(event = "daemon.server.sigterm_unavailable", error = %e);
                    let _ = tokio::signal::ctrl_c().await;
                    shutdown.cancel();
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
                _ = shutdown.cancelled() => return,
            }
        }
        #[cfg(not(unix))]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = shutdown.cancelled() => return,
            }
        }
        info!(event = "daemon.server.signal_received");
        shutdown.cancel();
    });
}

/// Turn PTY reader exits into session exits.
async fn handle_pty_exits(
    mut exit_rx: mpsc::UnboundedReceiver<PtyExitEvent>,
    session_manager: Arc<Mutex<SessionManager>>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            event = exit_rx.recv() => {
                let Some(PtyExitEvent { session_id }) = event else { break };
                let mut mgr = session_manager.lock().await;
                if !mgr.handle_pty_exit(&session_id) {
                    debug!(event = "daemon.server.exit_ignored", session_id = session_id);
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}
