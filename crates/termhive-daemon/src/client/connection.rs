use std::collections::VecDeque;
use std::path::Path;

use tokio::io::BufReader;
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tracing::debug;

use termhive_core::LifecycleState;
use termhive_core::daemon::CreateSessionRequest;
use termhive_core::protocol::{decode_bytes, encode_bytes};

use crate::errors::DaemonError;
use crate::protocol::codec::{read_message, write_message};
use crate::protocol::{ClientMessage, DaemonMessage, SessionInfo};

/// Async client for the daemon socket.
///
/// Holds one connection. After `attach`, `restore` or `subscribe_events`
/// the daemon streams on this connection too; streamed messages read while
/// waiting for a reply are queued for [`DaemonClient::read_next`].
pub struct DaemonClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    pending: VecDeque<DaemonMessage>,
    next_id: u64,
}

impl DaemonClient {
    /// Connect to the daemon at the given socket path.
    pub async fn connect(socket_path: &Path) -> Result<Self, DaemonError> {
        let stream = UnixStream::connect(socket_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::ConnectionRefused
                || e.kind() == std::io::ErrorKind::NotFound
            {
                DaemonError::NotRunning
            } else {
                DaemonError::ConnectionFailed(e.to_string())
            }
        })?;

        let (reader, writer) = stream.into_split();

        debug!(
            event = "daemon.client.connected",
            socket = %socket_path.display(),
        );

        Ok(Self {
            reader: BufReader::new(reader),
            writer,
            pending: VecDeque::new(),
            next_id: 1,
        })
    }

    fn next_id(&mut self) -> String {
        let id = self.next_id;
        self.next_id += 1;
        format!("req-{}", id)
    }

    /// Send a request and read its reply, queueing streamed messages.
    async fn request(&mut self, msg: &ClientMessage) -> Result<DaemonMessage, DaemonError> {
        write_message(&mut self.writer, msg).await?;
        loop {
            let response: DaemonMessage = read_message(&mut self.reader)
                .await?
                .ok_or_else(|| DaemonError::ConnectionFailed("connection closed".to_string()))?;
            if response.reply_id().is_some() {
                Self::check_error(&response)?;
                return Ok(response);
            }
            self.pending.push_back(response);
        }
    }

    /// Convert an error reply into a typed error.
    fn check_error(response: &DaemonMessage) -> Result<(), DaemonError> {
        if let DaemonMessage::Error { code, message, .. } = response {
            return Err(match code.as_str() {
                "session_not_found" => DaemonError::SessionNotFound(message.clone()),
                "session_already_exists" => DaemonError::SessionAlreadyExists(message.clone()),
                "session_dormant" => DaemonError::SessionDormant(message.clone()),
                "invalid_request" => DaemonError::InvalidRequest(message.clone()),
                "pty_error" => DaemonError::PtyError(message.clone()),
                _ => DaemonError::ProtocolError(format!("{}: {}", code, message)),
            });
        }
        Ok(())
    }

    fn unexpected(response: &DaemonMessage) -> DaemonError {
        DaemonError::ProtocolError(format!("unexpected response type: {:?}", response))
    }

    pub async fn ping(&mut self) -> Result<(), DaemonError> {
        let id = self.next_id();
        self.request(&ClientMessage::Ping { id }).await?;
        Ok(())
    }

    pub async fn create_session(
        &mut self,
        request: &CreateSessionRequest,
    ) -> Result<SessionInfo, DaemonError> {
        let id = self.next_id();
        let msg = ClientMessage::CreateSession {
            id,
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

        match self.request(&msg).await? {
            DaemonMessage::SessionCreated { session, .. } => Ok(session),
            other => Err(Self::unexpected(&other)),
        }
    }

    /// Subscribe to a live session's output. Replay and then live output
    /// follow through `read_next()`.
    pub async fn attach(&mut self, session_id: &str) -> Result<(), DaemonError> {
        let id = self.next_id();
        let msg = ClientMessage::Attach {
            id,
            session_id: session_id.to_string(),
        };
        self.request(&msg).await?;
        Ok(())
    }

    /// Start buffering a session's output.
    pub async fn evict(&mut self, session_id: &str) -> Result<(), DaemonError> {
        let id = self.next_id();
        let msg = ClientMessage::EvictSession {
            id,
            session_id: session_id.to_string(),
        };
        self.request(&msg).await?;
        Ok(())
    }

    /// Flush a dormant session's buffer and subscribe to its output.
    ///
    /// Returns the flushed bytes; live output follows through `read_next()`.
    pub async fn restore(&mut self, session_id: &str) -> Result<Vec<u8>, DaemonError> {
        let id = self.next_id();
        let msg = ClientMessage::RestoreSession {
            id,
            session_id: session_id.to_string(),
        };
        match self.request(&msg).await? {
            DaemonMessage::Restored { data, .. } => decode_bytes(&data)
                .map_err(|e| DaemonError::ProtocolError(format!("invalid restore data: {}", e))),
            other => Err(Self::unexpected(&other)),
        }
    }

    pub async fn resize_pty(
        &mut self,
        session_id: &str,
        rows: u16,
        cols: u16,
    ) -> Result<(), DaemonError> {
        let id = self.next_id();
        let msg = ClientMessage::ResizePty {
            id,
            session_id: session_id.to_string(),
            rows,
            cols,
        };
        self.request(&msg).await?;
        Ok(())
    }

    pub async fn write_stdin(&mut self, session_id: &str, data: &[u8]) -> Result<(), DaemonError> {
        let id = self.next_id();
        let msg = ClientMessage::WriteStdin {
            id,
            session_id: session_id.to_string(),
            data: encode_bytes(data),
        };
        self.request(&msg).await?;
        Ok(())
    }

    pub async fn set_state(
        &mut self,
        session_id: &str,
        state: LifecycleState,
    ) -> Result<(), DaemonError> {
        let id = self.next_id();
        let msg = ClientMessage::SetState {
            id,
            session_id: session_id.to_string(),
            state,
        };
        self.request(&msg).await?;
        Ok(())
    }

    pub async fn close_session(&mut self, session_id: &str) -> Result<(), DaemonError> {
        let id = self.next_id();
        let msg = ClientMessage::CloseSession {
            id,
            session_id: session_id.to_string(),
        };
        self.request(&msg).await?;
        Ok(())
    }

    /// List all sessions, optionally filtered by project.
    pub async fn list_sessions(
        &mut self,
        project_id: Option<&str>,
    ) -> Result<Vec<SessionInfo>, DaemonError> {
        let id = self.next_id();
        let msg = ClientMessage::ListSessions {
            id,
            project_id: project_id.map(String::from),
        };
        match self.request(&msg).await? {
            DaemonMessage::SessionList { sessions, .. } => Ok(sessions),
            other => Err(Self::unexpected(&other)),
        }
    }

    pub async fn get_session(&mut self, session_id: &str) -> Result<SessionInfo, DaemonError> {
        let id = self.next_id();
        let msg = ClientMessage::GetSession {
            id,
            session_id: session_id.to_string(),
        };
        match self.request(&msg).await? {
            DaemonMessage::SessionInfo { session, .. } => Ok(session),
            other => Err(Self::unexpected(&other)),
        }
    }

    /// Receive `state_changed` and `session_exited` through `read_next()`.
    pub async fn subscribe_events(&mut self) -> Result<(), DaemonError> {
        let id = self.next_id();
        self.request(&ClientMessage::SubscribeEvents { id }).await?;
        Ok(())
    }

    /// Request daemon shutdown.
    pub async fn shutdown(&mut self) -> Result<(), DaemonError> {
        let id = self.next_id();
        self.request(&ClientMessage::DaemonStop { id }).await?;
        Ok(())
    }

    /// Next streamed message. `Ok(None)` once the daemon closes the socket.
    pub async fn read_next(&mut self) -> Result<Option<DaemonMessage>, DaemonError> {
        if let Some(msg) = self.pending.pop_front() {
            return Ok(Some(msg));
        }
        let msg = read_message(&mut self.reader).await?;
        if let Some(ref m) = msg {
            Self::check_error(m)?;
        }
        Ok(msg)
    }
}
