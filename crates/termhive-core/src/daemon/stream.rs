use std::io::BufReader;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;

use tracing::{debug, warn};

use super::errors::SupervisorError;
use crate::pool::{CloseHandle, OutputSource};
use crate::protocol::codec::read_message;
use crate::protocol::{DaemonMessage, SupervisorEvent, decode_bytes};

/// Shuts a streaming connection down from another thread.
pub struct SocketCloser(UnixStream);

impl CloseHandle for SocketCloser {
    fn close(&self) {
        // The peer may already be gone.
        let _ = self.0.shutdown(Shutdown::Both);
    }
}

/// Live output of one session after `attach` or `restore_session`.
pub struct OutputStream {
    session_id: String,
    reader: BufReader<UnixStream>,
}

impl OutputStream {
    pub(crate) fn new(session_id: &str, reader: BufReader<UnixStream>) -> Self {
        Self {
            session_id: session_id.to_string(),
            reader,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Next push message for this session. `Ok(None)` when the daemon hung up.
    pub fn next_event(&mut self) -> Result<Option<SupervisorEvent>, SupervisorError> {
        next_event(&mut self.reader)
    }

    pub fn closer(&self) -> Result<SocketCloser, SupervisorError> {
        Ok(SocketCloser(self.reader.get_ref().try_clone()?))
    }
}

impl OutputSource for OutputStream {
    fn next_chunk(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        loop {
            let event = self
                .next_event()
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            match event {
                Some(SupervisorEvent::Data { bytes, .. }) => return Ok(Some(bytes)),
                Some(SupervisorEvent::OutputDropped { chunks_dropped, .. }) => {
                    warn!(
                        event = "core.daemon.output_dropped",
                        session_id = self.session_id,
                        chunks_dropped = chunks_dropped,
                    );
                }
                Some(SupervisorEvent::Exited { .. }) | None => return Ok(None),
                Some(SupervisorEvent::StateChanged { .. } | SupervisorEvent::Resync { .. }) => {}
            }
        }
    }

    fn close_handle(&self) -> std::io::Result<Box<dyn CloseHandle>> {
        Ok(Box::new(SocketCloser(self.reader.get_ref().try_clone()?)))
    }
}

/// State-change and exit events for every session.
pub struct EventStream {
    reader: BufReader<UnixStream>,
}

impl EventStream {
    pub(crate) fn new(reader: BufReader<UnixStream>) -> Self {
        Self { reader }
    }

    pub fn next_event(&mut self) -> Result<Option<SupervisorEvent>, SupervisorError> {
        next_event(&mut self.reader)
    }

    pub fn closer(&self) -> Result<SocketCloser, SupervisorError> {
        Ok(SocketCloser(self.reader.get_ref().try_clone()?))
    }
}

fn next_event(
    reader: &mut BufReader<UnixStream>,
) -> Result<Option<SupervisorEvent>, SupervisorError> {
    loop {
        let msg: Option<DaemonMessage> = read_message(reader)?;
        let Some(msg) = msg else {
            return Ok(None);
        };
        if let Some(event) = to_event(msg)? {
            return Ok(Some(event));
        }
    }
}

/// Convert a push message. Replies that are not events are skipped.
pub(crate) fn to_event(msg: DaemonMessage) -> Result<Option<SupervisorEvent>, SupervisorError> {
    let event = match msg {
        DaemonMessage::PtyOutput { session_id, data } => {
            let bytes = decode_bytes(&data).map_err(|e| SupervisorError::ProtocolError {
                message: format!("invalid base64 output: {}", e),
            })?;
            SupervisorEvent::Data { session_id, bytes }
        }
        DaemonMessage::PtyOutputDropped {
            session_id,
            chunks_dropped,
        } => SupervisorEvent::OutputDropped {
            session_id,
            chunks_dropped,
        },
        DaemonMessage::EventsLagged { events_dropped } => {
            warn!(event = "core.daemon.events_lagged", events_dropped = events_dropped);
            SupervisorEvent::Resync { events_dropped }
        }
        DaemonMessage::StateChanged { session_id, state } => {
            SupervisorEvent::StateChanged { session_id, state }
        }
        DaemonMessage::SessionExited {
            session_id,
            exit_code,
        } => SupervisorEvent::Exited {
            session_id,
            exit_code,
        },
        other => {
            debug!(event = "core.daemon.unexpected_push", message = ?other);
            return Ok(None);
        }
    };
    Ok(Some(event))
}
