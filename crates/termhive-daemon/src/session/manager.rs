use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use termhive_core::{LifecycleState, SessionKind, SessionRegistry};

use crate::buffer::EvictionBufferStore;
use crate::errors::DaemonError;
use crate::protocol::{DaemonMessage, SessionInfo};
use crate::pty::manager::{PtyManager, SpawnSpec};
use crate::pty::output::{PtyExitEvent, lock_store, spawn_pty_reader};
use crate::session::state::{ClientId, DaemonSession};
use crate::types::DaemonConfig;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Parameters of `create_session`.
#[derive(Debug, Clone)]
pub struct CreateParams {
    pub project_id: String,
    pub worktree_id: Option<String>,
    pub kind: SessionKind,
    pub title: Option<String>,
    pub working_directory: String,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env_vars: HashMap<String, String>,
    pub rows: u16,
    pub cols: u16,
}

/// Output subscription plus the bytes that precede it.
pub type Subscription = (broadcast::Receiver<Vec<u8>>, Vec<u8>);

/// The PTY Supervisor.
///
/// Session records live in the registry; PTYs, output channels and client
/// sets live in `sessions`. Both are keyed by session id and only ever
/// gain or lose an entry together.
pub struct SessionManager {
    registry: SessionRegistry,
    sessions: HashMap<String, DaemonSession>,
    pty_manager: PtyManager,
    buffers: Arc<Mutex<EvictionBufferStore>>,
    events_tx: broadcast::Sender<DaemonMessage>,
    config: DaemonConfig,
    next_client_id: ClientId,
    pty_exit_tx: mpsc::UnboundedSender<PtyExitEvent>,
}

impl SessionManager {
    pub fn new(config: DaemonConfig, pty_exit_tx: mpsc::UnboundedSender<PtyExitEvent>) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            registry: SessionRegistry::new(),
            sessions: HashMap::new(),
            pty_manager: PtyManager::new(),
            buffers: Arc::new(Mutex::new(EvictionBufferStore::new(
                config.eviction_buffer_size,
            ))),
            events_tx,
            config,
            next_client_id: 1,
            pty_exit_tx,
        }
    }

    pub fn next_client_id(&mut self) -> ClientId {
        let id = self.next_client_id;
        self.next_client_id = self.next_client_id.wrapping_add(1);
        id
    }

    /// Register a session and spawn its PTY.
    pub fn create_session(&mut self, params: CreateParams) -> Result<SessionInfo, DaemonError> {
        let session_id = self.registry.create(
            &params.project_id,
            params.worktree_id.as_deref(),
            params.kind,
        )?;
        if let Some(title) = &params.title {
            self.registry.set_title(&session_id, title)?;
        }

        info!(
            event = "daemon.session.create_started",
            session_id = session_id,
            project_id = params.project_id,
            kind = %params.kind,
            working_directory = params.working_directory,
        );

        let spec = self.spawn_spec(&session_id, &params);
        match self.spawn(&session_id, &spec, &params.working_directory) {
            Ok(session) => {
                self.sessions.insert(session_id.clone(), session);
            }
            Err(e) => {
                self.registry.remove(&session_id);
                error!(
                    event = "daemon.session.create_failed",
                    session_id = session_id,
                    error = %e,
                );
                return Err(e);
            }
        }

        let info = self.session_info(&session_id).ok_or_else(|| {
            DaemonError::SessionNotFound(session_id.clone())
        })?;
        info!(
            event = "daemon.session.create_completed",
            session_id = session_id,
            pid = ?info.pid,
        );
        Ok(info)
    }

    fn spawn_spec(&self, session_id: &str, params: &CreateParams) -> SpawnSpec {
        let (command, args) = match (&params.command, params.kind) {
            (Some(command), _) => (Some(command.clone()), params.args.clone()),
            (None, SessionKind::InteractiveAgent) => {
                let mut args = self.config.agent_args.clone();
                args.extend(params.args.iter().cloned());
                (Some(self.config.agent_command.clone()), args)
            }
            (None, SessionKind::PlainShell) => (None, Vec::new()),
        };

        let mut env_vars: Vec<(String, String)> = params
            .env_vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        env_vars.push(("TERMHIVE_SESSION_ID".to_string(), session_id.to_string()));
        env_vars.push(("TERMHIVE_PROJECT_ID".to_string(), params.project_id.clone()));
        if let Some(worktree) = &params.worktree_id {
            env_vars.push(("TERMHIVE_WORKTREE_ID".to_string(), worktree.clone()));
        }

        SpawnSpec {
            command,
            args,
            working_dir: PathBuf::from(&params.working_directory),
            env_vars,
            rows: params.rows,
            cols: params.cols,
        }
    }

    fn spawn(
        &mut self,
        session_id: &str,
        spec: &SpawnSpec,
        working_directory: &str,
    ) -> Result<DaemonSession, DaemonError> {
        let pty = self.pty_manager.create(session_id, spec)?;
        let pid = pty.child_process_id();
        let reader = match pty.try_clone_reader() {
            Ok(reader) => reader,
            Err(e) => {
                let _ = self.pty_manager.destroy(session_id);
                return Err(e);
            }
        };

        let mut session = DaemonSession::new(
            session_id.to_string(),
            working_directory.to_string(),
            self.config.replay_buffer_size,
            self.config.broadcast_capacity,
        );
        session.set_pid(pid);

        spawn_pty_reader(
            session_id.to_string(),
            reader,
            session.output_sender(),
            session.shared_replay(),
            Arc::clone(&self.buffers),
            Some(self.pty_exit_tx.clone()),
        );
        Ok(session)
    }

    /// Subscribe a client to live output. Returns recent output to replay.
    ///
    /// Subscribes before copying the replay ring so nothing falls between.
    pub fn attach_client(
        &mut self,
        session_id: &str,
        client_id: ClientId,
    ) -> Result<Subscription, DaemonError> {
        if self.is_dormant(session_id) {
            return Err(DaemonError::SessionDormant(session_id.to_string()));
        }
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| DaemonError::SessionNotFound(session_id.to_string()))?;

        session.attach_client(client_id);
        let rx = session.subscribe_output();
        let replay = session.replay_contents();

        debug!(
            event = "daemon.session.client_attached",
            session_id = session_id,
            client_id = client_id,
            client_count = session.client_count(),
        );
        Ok((rx, replay))
    }

    pub fn detach_client(&mut self, session_id: &str, client_id: ClientId) {
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.detach_client(client_id);
        }
    }

    pub fn detach_client_from_all(&mut self, client_id: ClientId) {
        for session in self.sessions.values_mut() {
            session.detach_client(client_id);
        }
    }

    /// Start buffering output for `session_id`. Evicting twice is a no-op.
    pub fn evict_session(&mut self, session_id: &str) -> Result<(), DaemonError> {
        if !self.sessions.contains_key(session_id) {
            return Err(DaemonError::SessionNotFound(session_id.to_string()));
        }

        let opened = lock_store(&self.buffers, session_id).open_for(session_id);
        if opened {
            info!(event = "daemon.session.evict_completed", session_id = session_id);
        } else {
            debug!(event = "daemon.session.evict_already_dormant", session_id = session_id);
        }
        Ok(())
    }

    /// Subscribe, then flush and clear the eviction buffer, in that order
    /// and under the store lock. Restoring a live session flushes nothing.
    pub fn restore_session(
        &mut self,
        session_id: &str,
        client_id: ClientId,
    ) -> Result<Subscription, DaemonError> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| DaemonError::SessionNotFound(session_id.to_string()))?;

        let (rx, flushed) = {
            let mut buffers = lock_store(&self.buffers, session_id);
            let rx = session.subscribe_output();
            (rx, buffers.flush_and_clear(session_id))
        };
        session.attach_client(client_id);

        let flushed = match flushed {
            Some(bytes) => {
                info!(
                    event = "daemon.session.restore_completed",
                    session_id = session_id,
                    flushed_bytes = bytes.len(),
                );
                bytes
            }
            None => {
                debug!(event = "daemon.session.restore_not_dormant", session_id = session_id);
                Vec::new()
            }
        };
        Ok((rx, flushed))
    }

    pub fn resize_pty(&mut self, session_id: &str, rows: u16, cols: u16) -> Result<(), DaemonError> {
        self.pty_manager
            .get_mut(session_id)
            .ok_or_else(|| DaemonError::SessionNotFound(session_id.to_string()))?
            .resize(rows, cols)
    }

    pub fn write_stdin(&mut self, session_id: &str, data: &[u8]) -> Result<(), DaemonError> {
        self.pty_manager
            .get(session_id)
            .ok_or_else(|| DaemonError::SessionNotFound(session_id.to_string()))?
            .write_stdin(data)?;
        self.registry.record_activity(session_id);
        Ok(())
    }

    /// Validated lifecycle transition. Emits `state_changed` when it moved.
    pub fn set_state(&mut self, session_id: &str, state: LifecycleState) -> Result<(), DaemonError> {
        let previous = self.registry.set_state(session_id, state)?;
        if previous != state {
            info!(
                event = "daemon.session.state_changed",
                session_id = session_id,
                from = %previous,
                to = %state,
            );
            self.emit(DaemonMessage::StateChanged {
                session_id: session_id.to_string(),
                state,
            });
        }
        Ok(())
    }

    /// Kill the PTY and drop every trace of the session.
    pub fn close_session(&mut self, session_id: &str) -> Result<(), DaemonError> {
        if !self.sessions.contains_key(session_id) {
            return Err(DaemonError::SessionNotFound(session_id.to_string()));
        }
        info!(event = "daemon.session.close_started", session_id = session_id);

        match self.pty_manager.destroy(session_id) {
            Ok(()) | Err(DaemonError::SessionNotFound(_)) => {}
            Err(e) => {
                warn!(
                    event = "daemon.session.possible_orphaned_process",
                    session_id = session_id,
                    error = %e,
                );
            }
        }

        self.finish(session_id, None);
        info!(event = "daemon.session.close_completed", session_id = session_id);
        Ok(())
    }

    /// The PTY reader ended. Returns false for sessions already gone.
    pub fn handle_pty_exit(&mut self, session_id: &str) -> bool {
        let exit_code = match self.pty_manager.remove(session_id) {
            Some(mut pty) => match pty.wait() {
                Ok(status) => Some(status.exit_code() as i32),
                Err(e) => {
                    warn!(
                        event = "daemon.session.exit_code_unavailable",
                        session_id = session_id,
                        error = %e,
                    );
                    None
                }
            },
            None => None,
        };

        if !self.sessions.contains_key(session_id) {
            debug!(event = "daemon.session.exit_after_close", session_id = session_id);
            return false;
        }

        info!(
            event = "daemon.session.pty_exited",
            session_id = session_id,
            exit_code = ?exit_code,
            dormant = self.is_dormant(session_id),
        );
        self.finish(session_id, exit_code);
        true
    }

    /// Shared tail of close and exit: buffer, state, events, records.
    fn finish(&mut self, session_id: &str, exit_code: Option<i32>) {
        if lock_store(&self.buffers, session_id).delete(session_id) {
            debug!(event = "daemon.buffer.deleted", session_id = session_id);
        }

        if let Err(e) = self.registry.set_state(session_id, LifecycleState::Stopped) {
            error!(
                event = "daemon.session.stop_transition_failed",
                session_id = session_id,
                error = %e,
            );
        }
        self.emit(DaemonMessage::StateChanged {
            session_id: session_id.to_string(),
            state: LifecycleState::Stopped,
        });
        self.emit(DaemonMessage::SessionExited {
            session_id: session_id.to_string(),
            exit_code,
        });

        self.sessions.remove(session_id);
        self.registry.remove(session_id);
    }

    fn emit(&self, event: DaemonMessage) {
        // No subscribers is normal.
        let _ = self.events_tx.send(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DaemonMessage> {
        self.events_tx.subscribe()
    }

    pub fn is_dormant(&self, session_id: &str) -> bool {
        lock_store(&self.buffers, session_id).has(session_id)
    }

    fn session_info(&self, session_id: &str) -> Option<SessionInfo> {
        let record = self.registry.get(session_id)?;
        let runtime = self.sessions.get(session_id)?;
        let buffered = lock_store(&self.buffers, session_id).size_of(session_id);
        Some(runtime.to_session_info(record, buffered))
    }

    pub fn get_session(&self, session_id: &str) -> Option<SessionInfo> {
        self.session_info(session_id)
    }

    /// Sessions, oldest first, optionally for one project.
    pub fn list_sessions(&self, project_id: Option<&str>) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .registry
            .list()
            .into_iter()
            .filter(|s| project_id.is_none_or(|p| s.project_id == p))
            .filter_map(|s| self.session_info(&s.id))
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        sessions
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn active_pty_count(&self) -> usize {
        self.pty_manager.count()
    }

    #[cfg(test)]
    pub fn client_count(&self, session_id: &str) -> Option<usize> {
        self.sessions.get(session_id).map(|s| s.client_count())
    }

    /// Close every session (shutdown).
    pub fn stop_all(&mut self) {
        let ids: Vec<String> = self.sessions.keys().cloned().collect();
        let mut failed: Vec<String> = Vec::new();
        for session_id in ids {
            if let Err(e) = self.close_session(&session_id) {
                warn!(
                    event = "daemon.session.stop_failed",
                    session_id = session_id,
                    error = %e,
                );
                failed.push(session_id);
            }
        }
        if !failed.is_empty() {
            error!(
                event = "daemon.session.shutdown_incomplete",
                failed_count = failed.len(),
                failed_sessions = ?failed,
            );
        }
    }
}
