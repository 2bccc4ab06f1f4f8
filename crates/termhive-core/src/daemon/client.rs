use std::collections::HashMap;
use std::io::{BufReader, ErrorKind};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::errors::SupervisorError;
use super::stream::{EventStream, OutputStream};
use crate::config::{Config, TermhiveConfig};
use crate::pool::{Restoration, SupervisorPort};
use crate::protocol::codec::{read_message, write_message};
use crate::protocol::{ClientMessage, DaemonMessage, SessionInfo, decode_bytes, encode_bytes};
use crate::sessions::{LifecycleState, SessionKind};

/// Parameters for `create_session`.
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub project_id: String,
    pub worktree_id: Option<String>,
    pub kind: SessionKind,
    pub title: Option<String>,
    /// Working directory for the PTY process.
    pub working_directory: PathBuf,
    /// Overrides the daemon's agent command or login shell.
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env_vars: HashMap<String, String>,
    pub rows: u16,
    pub cols: u16,
}

impl CreateSessionRequest {
    pub fn new(project_id: &str, kind: SessionKind, working_directory: PathBuf) -> Self {
        Self {
            project_id: project_id.to_string(),
            worktree_id: None,
            kind,
            title: None,
            working_directory,
            command: None,
            args: Vec::new(),
            env_vars: HashMap::new(),
            rows: 24,
            cols: 80,
        }
    }
}

/// Blocking client for the PTY supervisor daemon.
#[derive(Debug, Clone)]
pub struct DaemonSupervisor {
    socket_path: PathBuf,
    timeout: Duration,
}

impl DaemonSupervisor {
    pub fn new(socket_path: PathBuf, timeout: Duration) -> Self {
        Self {
            socket_path,
            timeout,
        }
    }

    pub fn from_config(config: &TermhiveConfig, runtime: &Config) -> Self {
        Self::new(
            config.daemon.resolve_socket_path(runtime),
            Duration::from_secs(config.daemon.request_timeout_secs),
        )
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// True when a daemon answers on the socket.
    pub fn is_running(&self) -> bool {
        self.ping().is_ok()
    }

    pub fn ping(&self) -> Result<(), SupervisorError> {
        let (reply, _) = self.request(&ClientMessage::Ping { id: request_id() })?;
        expect_ack(reply)
    }

    pub fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<SessionInfo, SupervisorError> {
        info!(
            event = "core.daemon.create_session_started",
            project_id = request.project_id,
            kind = %request.kind,
        );

        let msg = ClientMessage::CreateSession {
            id: request_id(),
            project_id: request.project_id.clone(),
            worktree_id: request.worktree_id.clone(),
            kind: request.kind,
            title: request.title.clone(),
            working_directory: request.working_directory.to_string_lossy().to_string(),
            command: request.command.clone(),
            args: request.args.clone(),
            env_vars: request.env_vars.clone(),
            rows: request.rows,
            cols: request.cols,
        };

        match self.request(&msg)?.0 {
            DaemonMessage::SessionCreated { session, .. } => {
                info!(
                    event = "core.daemon.create_session_completed",
                    session_id = session.id,
                );
                Ok(session)
            }
            other => Err(unexpected(&other)),
        }
    }

    /// Subscribe to a live session. The stream starts with recent output.
    pub fn attach(&self, session_id: &str) -> Result<OutputStream, SupervisorError> {
        let (reply, reader) = self.request(&ClientMessage::Attach {
            id: request_id(),
            session_id: session_id.to_string(),
        })?;
        expect_ack(reply)?;
        into_streaming(&reader)?;
        Ok(OutputStream::new(session_id, reader))
    }

    pub fn write_stdin(&self, session_id: &str, data: &[u8]) -> Result<(), SupervisorError> {
        let (reply, _) = self.request(&ClientMessage::WriteStdin {
            id: request_id(),
            session_id: session_id.to_string(),
            data: encode_bytes(data),
        })?;
        expect_ack(reply)
    }

    pub fn resize(&self, session_id: &str, rows: u16, cols: u16) -> Result<(), SupervisorError> {
        let (reply, _) = self.request(&ClientMessage::ResizePty {
            id: request_id(),
            session_id: session_id.to_string(),
            rows,
            cols,
        })?;
        expect_ack(reply)
    }

    pub fn close_session(&self, session_id: &str) -> Result<(), SupervisorError> {
        info!(event = "core.daemon.close_session_started", session_id = session_id);
        let (reply, _) = self.request(&ClientMessage::CloseSession {
            id: request_id(),
            session_id: session_id.to_string(),
        })?;
        expect_ack(reply)?;
        info!(event = "core.daemon.close_session_completed", session_id = session_id);
        Ok(())
    }

    pub fn evict(&self, session_id: &str) -> Result<(), SupervisorError> {
        let (reply, _) = self.request(&ClientMessage::EvictSession {
            id: request_id(),
            session_id: session_id.to_string(),
        })?;
        expect_ack(reply)
    }

    /// Flushed bytes plus a stream that was subscribed before the flush.
    pub fn restore(&self, session_id: &str) -> Result<Restoration<OutputStream>, SupervisorError> {
        let (reply, reader) = self.request(&ClientMessage::RestoreSession {
            id: request_id(),
            session_id: session_id.to_string(),
        })?;

        let flushed = match reply {
            DaemonMessage::Restored { data, .. } => {
                decode_bytes(&data).map_err(|e| SupervisorError::ProtocolError {
                    message: format!("invalid base64 in restored payload: {}", e),
                })?
            }
            other => return Err(unexpected(&other)),
        };

        into_streaming(&reader)?;
        debug!(
            event = "core.daemon.restore_completed",
            session_id = session_id,
            flushed_bytes = flushed.len(),
        );
        Ok(Restoration {
            flushed,
            stream: OutputStream::new(session_id, reader),
        })
    }

    pub fn set_state(&self, session_id: &str, state: LifecycleState) -> Result<(), SupervisorError> {
        let (reply, _) = self.request(&ClientMessage::SetState {
            id: request_id(),
            session_id: session_id.to_string(),
            state,
        })?;
        expect_ack(reply)
    }

    pub fn list_sessions(
        &self,
        project_id: Option<&str>,
    ) -> Result<Vec<SessionInfo>, SupervisorError> {
        let (reply, _) = self.request(&ClientMessage::ListSessions {
            id: request_id(),
            project_id: project_id.map(String::from),
        })?;
        match reply {
            DaemonMessage::SessionList { sessions, .. } => Ok(sessions),
            other => Err(unexpected(&other)),
        }
    }

    pub fn get_session(&self, session_id: &str) -> Result<SessionInfo, SupervisorError> {
        let (reply, _) = self.request(&ClientMessage::GetSession {
            id: request_id(),
            session_id: session_id.to_string(),
        })?;
        match reply {
            DaemonMessage::SessionInfo { session, .. } => Ok(session),
            other => Err(unexpected(&other)),
        }
    }

    /// State-change and exit events for all sessions.
    pub fn subscribe_events(&self) -> Result<EventStream, SupervisorError> {
        let (reply, reader) = self.request(&ClientMessage::SubscribeEvents { id: request_id() })?;
        expect_ack(reply)?;
        into_streaming(&reader)?;
        Ok(EventStream::new(reader))
    }

    pub fn stop_daemon(&self) -> Result<(), SupervisorError> {
        info!(event = "core.daemon.stop_requested");
        let (reply, _) = self.request(&ClientMessage::DaemonStop { id: request_id() })?;
        expect_ack(reply)
    }

    /// Send one request on a fresh connection and read its reply.
    ///
    /// The reader is returned so streaming requests keep whatever the
    /// daemon sent right after the reply.
    fn request(
        &self,
        msg: &ClientMessage,
    ) -> Result<(DaemonMessage, BufReader<UnixStream>), SupervisorError> {
        let mut stream = self.connect()?;
        write_message(&mut stream, msg).map_err(|e| self.map_io(e))?;

        let mut reader = BufReader::new(stream);
        let reply: Option<DaemonMessage> = read_message(&mut reader).map_err(|e| self.map_io(e))?;
        let reply = reply.ok_or_else(|| SupervisorError::ProtocolError {
            message: "Empty response from daemon".to_string(),
        })?;

        if let DaemonMessage::Error { code, message, .. } = reply {
            return Err(map_daemon_error(msg, code, message));
        }
        Ok((reply, reader))
    }

    fn connect(&self) -> Result<UnixStream, SupervisorError> {
        let path = self.socket_path.display().to_string();
        if !self.socket_path.exists() {
            return Err(SupervisorError::NotRunning { path });
        }

        let stream = UnixStream::connect(&self.socket_path).map_err(|e| {
            if matches!(e.kind(), ErrorKind::ConnectionRefused | ErrorKind::NotFound) {
                SupervisorError::NotRunning { path: path.clone() }
            } else {
                SupervisorError::ConnectionFailed {
                    message: e.to_string(),
                }
            }
        })?;

        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        Ok(stream)
    }

    fn map_io(&self, e: std::io::Error) -> SupervisorError {
        match e.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                warn!(
                    event = "core.daemon.request_timed_out",
                    timeout_secs = self.timeout.as_secs(),
                );
                SupervisorError::Timeout {
                    seconds: self.timeout.as_secs(),
                }
            }
            ErrorKind::InvalidData => SupervisorError::ProtocolError {
                message: e.to_string(),
            },
            ErrorKind::BrokenPipe | ErrorKind::ConnectionReset => {
                SupervisorError::ConnectionFailed {
                    message: e.to_string(),
                }
            }
            _ => SupervisorError::Io(e),
        }
    }
}

impl SupervisorPort for DaemonSupervisor {
    type Stream = OutputStream;

    fn begin_buffering(&mut self, id: &str) -> Result<(), SupervisorError> {
        self.evict(id)
    }

    fn restore(&mut self, id: &str) -> Result<Restoration<OutputStream>, SupervisorError> {
        DaemonSupervisor::restore(self, id)
    }

    fn close(&mut self, id: &str) -> Result<(), SupervisorError> {
        self.close_session(id)
    }
}

/// Streams block until the daemon pushes something.
fn into_streaming(reader: &BufReader<UnixStream>) -> Result<(), SupervisorError> {
    reader.get_ref().set_read_timeout(None)?;
    Ok(())
}

fn expect_ack(reply: DaemonMessage) -> Result<(), SupervisorError> {
    match reply {
        DaemonMessage::Ack { .. } => Ok(()),
        other => Err(unexpected(&other)),
    }
}

fn unexpected(reply: &DaemonMessage) -> SupervisorError {
    SupervisorError::ProtocolError {
        message: format!("Unexpected reply: {:?}", reply),
    }
}

fn map_daemon_error(request: &ClientMessage, code: String, message: String) -> SupervisorError {
    if code == "session_not_found" {
        let id = match request {
            ClientMessage::Attach { session_id, .. }
            | ClientMessage::WriteStdin { session_id, .. }
            | ClientMessage::ResizePty { session_id, .. }
            | ClientMessage::CloseSession { session_id, .. }
            | ClientMessage::EvictSession { session_id, .. }
            | ClientMessage::RestoreSession { session_id, .. }
            | ClientMessage::SetState { session_id, .. }
            | ClientMessage::GetSession { session_id, .. } => session_id.clone(),
            _ => message.clone(),
        };
        return SupervisorError::SessionNotFound { id };
    }
    SupervisorError::DaemonError { code, message }
}

fn request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
