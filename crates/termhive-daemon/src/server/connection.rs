use std::sync::Arc;

use tokio::io::BufReader;
use tokio::net::UnixStream;
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use termhive_core::errors::TermhiveError;
use termhive_core::protocol::{decode_bytes, encode_bytes};

use crate::protocol::codec::{read_message, write_message};
use crate::protocol::{ClientMessage, DaemonMessage};
use crate::session::manager::{CreateParams, SessionManager, Subscription};
use crate::session::state::ClientId;

type Writer = Arc<Mutex<OwnedWriteHalf>>;

/// Handle a single client connection.
///
/// Reads JSONL requests, dispatches them to the session manager and writes
/// the replies. `attach`, `restore_session` and `subscribe_events` leave a
/// task streaming on the same connection until it closes.
pub async fn handle_connection(
    stream: UnixStream,
    session_manager: Arc<Mutex<SessionManager>>,
    shutdown: CancellationToken,
) {
    let client_id = {
        let mut mgr = session_manager.lock().await;
        mgr.next_client_id()
    };
    // Streaming tasks end with the connection as well as with the daemon.
    let connection_token = shutdown.child_token();

    debug!(event = "daemon.connection.accepted", client_id = client_id);

    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let writer: Writer = Arc::new(Mutex::new(writer));

    loop {
        tokio::select! {
            result = read_message::<_, ClientMessage>(&mut reader) => {
                match result {
                    Ok(Some(msg)) => {
                        let ctx = Context {
                            client_id,
                            session_manager: &session_manager,
                            writer: &writer,
                            connection: &connection_token,
                            shutdown: &shutdown,
                        };
                        if let Some(response) = dispatch_message(msg, ctx).await {
                            let mut w = writer.lock().await;
                            if let Err(e) = write_message(&mut *w, &response).await {
                                error!(
                                    event = "daemon.connection.write_failed",
                                    client_id = client_id,
                                    error = %e,
                                );
                                break;
                            }
                        }
                    }
                    Ok(None) => {
                        debug!(event = "daemon.connection.closed", client_id = client_id);
                        break;
                    }
                    Err(e) => {
                        warn!(
                            event = "daemon.connection.read_error",
                            client_id = client_id,
                            error = %e,
                        );
                        break;
                    }
                }
            }
            _ = connection_token.cancelled() => {
                debug!(event = "daemon.connection.shutdown", client_id = client_id);
                break;
            }
        }
    }

    connection_token.cancel();
    let mut mgr = session_manager.lock().await;
    mgr.detach_client_from_all(client_id);
}

struct Context<'a> {
    client_id: ClientId,
    session_manager: &'a Arc<Mutex<SessionManager>>,
    writer: &'a Writer,
    connection: &'a CancellationToken,
    shutdown: &'a CancellationToken,
}

fn error_reply<E: TermhiveError>(id: String, e: E) -> DaemonMessage {
    if e.is_user_error() {
        warn!(
            event = "daemon.connection.request_rejected",
            request_id = id,
            code = e.error_code(),
            error = %e,
        );
    } else {
        error!(
            event = "daemon.connection.request_failed",
            request_id = id,
            code = e.error_code(),
            error = %e,
        );
    }
    DaemonMessage::Error {
        id,
        code: e.error_code().to_string(),
        message: e.to_string(),
    }
}

/// Dispatch a request. `None` means the reply was already written inline.
async fn dispatch_message(msg: ClientMessage, ctx: Context<'_>) -> Option<DaemonMessage> {
    match msg {
        ClientMessage::CreateSession {
            id,
            project_id,
            worktree_id,
            kind,
            title,
            working_directory,
            command,
            args,
            env_vars,
            rows,
            cols,
        } => {
            let params = CreateParams {
                project_id,
                worktree_id,
                kind,
                title,
                working_directory,
                command,
                args,
                env_vars,
                rows,
                cols,
            };
            let mut mgr = ctx.session_manager.lock().await;
            match mgr.create_session(params) {
                Ok(session) => Some(DaemonMessage::SessionCreated { id, session }),
                Err(e) => Some(error_reply(id, e)),
            }
        }

        ClientMessage::Attach { id, session_id } => {
            let attached = {
                let mut mgr = ctx.session_manager.lock().await;
                mgr.attach_client(&session_id, ctx.client_id)
            };
            match attached {
                Ok(subscription) => {
                    start_stream(&ctx, subscription, &session_id, DaemonMessage::Ack { id }, true)
                        .await;
                    None
                }
                Err(e) => Some(error_reply(id, e)),
            }
        }

        ClientMessage::RestoreSession { id, session_id } => {
            let restored = {
                let mut mgr = ctx.session_manager.lock().await;
                mgr.restore_session(&session_id, ctx.client_id)
            };
            match restored {
                Ok((rx, flushed)) => {
                    let reply = DaemonMessage::Restored {
                        id,
                        session_id: session_id.clone(),
                        data: encode_bytes(&flushed),
                    };
                    start_stream(&ctx, (rx, Vec::new()), &session_id, reply, false).await;
                    None
                }
                Err(e) => Some(error_reply(id, e)),
            }
        }

        ClientMessage::EvictSession { id, session_id } => {
            let mut mgr = ctx.session_manager.lock().await;
            match mgr.evict_session(&session_id) {
                Ok(()) => Some(DaemonMessage::Ack { id }),
                Err(e) => Some(error_reply(id, e)),
            }
        }

        ClientMessage::ResizePty {
            id,
            session_id,
            rows,
            cols,
        } => {
            let mut mgr = ctx.session_manager.lock().await;
            match mgr.resize_pty(&session_id, rows, cols) {
                Ok(()) => Some(DaemonMessage::Ack { id }),
                Err(e) => Some(error_reply(id, e)),
            }
        }

        ClientMessage::WriteStdin {
            id,
            session_id,
            data,
        } => {
            let decoded = match decode_bytes(&data) {
                Ok(d) => d,
                Err(e) => {
                    return Some(DaemonMessage::Error {
                        id,
                        code: "base64_decode_error".to_string(),
                        message: e.to_string(),
                    });
                }
            };

            let mut mgr = ctx.session_manager.lock().await;
            match mgr.write_stdin(&session_id, &decoded) {
                Ok(()) => Some(DaemonMessage::Ack { id }),
                Err(e) => Some(error_reply(id, e)),
            }
        }

        ClientMessage::SetState {
            id,
            session_id,
            state,
        } => {
            let mut mgr = ctx.session_manager.lock().await;
            match mgr.set_state(&session_id, state) {
                Ok(()) => Some(DaemonMessage::Ack { id }),
                Err(e) => Some(error_reply(id, e)),
            }
        }

        ClientMessage::CloseSession { id, session_id } => {
            let mut mgr = ctx.session_manager.lock().await;
            match mgr.close_session(&session_id) {
                Ok(()) => Some(DaemonMessage::Ack { id }),
                Err(e) => Some(error_reply(id, e)),
            }
        }

        ClientMessage::ListSessions { id, project_id } => {
            let mgr = ctx.session_manager.lock().await;
            let sessions = mgr.list_sessions(project_id.as_deref());
            Some(DaemonMessage::SessionList { id, sessions })
        }

        ClientMessage::GetSession { id, session_id } => {
            let mgr = ctx.session_manager.lock().await;
            match mgr.get_session(&session_id) {
                Some(session) => Some(DaemonMessage::SessionInfo { id, session }),
                None => Some(DaemonMessage::Error {
                    id,
                    code: "session_not_found".to_string(),
                    message: format!("No session found with id '{}'", session_id),
                }),
            }
        }

        ClientMessage::SubscribeEvents { id } => {
            let rx = {
                let mgr = ctx.session_manager.lock().await;
                mgr.subscribe_events()
            };
            {
                let mut w = ctx.writer.lock().await;
                if let Err(e) = write_message(&mut *w, &DaemonMessage::Ack { id }).await {
                    warn!(
                        event = "daemon.connection.ack_write_failed",
                        client_id = ctx.client_id,
                        error = %e,
                    );
                    return None;
                }
            }
            let writer = Arc::clone(ctx.writer);
            let token = ctx.connection.clone();
            tokio::spawn(async move {
                stream_events(rx, writer, token).await;
            });
            None
        }

        ClientMessage::DaemonStop { id } => {
            info!(event = "daemon.server.stop_requested", client_id = ctx.client_id);
            ctx.shutdown.cancel();
            Some(DaemonMessage::Ack { id })
        }

        ClientMessage::Ping { id } => Some(DaemonMessage::Ack { id }),
    }
}

/// Write `reply` (and any replay) under the writer lock, then hand the
/// subscription to a streaming task. Everything the receiver queued since
/// subscribing is written after the reply.
async fn start_stream(
    ctx: &Context<'_>,
    (rx, replay): Subscription,
    session_id: &str,
    reply: DaemonMessage,
    send_replay: bool,
) {
    {
        let mut w = ctx.writer.lock().await;
        if let Err(e) = write_message(&mut *w, &reply).await {
            warn!(
                event = "daemon.connection.ack_write_failed",
                session_id = session_id,
                client_id = ctx.client_id,
                error = %e,
            );
            return;
        }

        if send_replay && !replay.is_empty() {
            let msg = DaemonMessage::PtyOutput {
                session_id: session_id.to_string(),
                data: encode_bytes(&replay),
            };
            if let Err(e) = write_message(&mut *w, &msg).await {
                warn!(
                    event = "daemon.connection.replay_write_failed",
                    session_id = session_id,
                    client_id = ctx.client_id,
                    error = %e,
                );
            }
        }
    }

    let writer = Arc::clone(ctx.writer);
    let session_id = session_id.to_string();
    let token = ctx.connection.clone();
    tokio::spawn(async move {
        stream_pty_output(rx, &session_id, writer, token).await;
    });
}

/// Stream PTY output to a client until the session ends or the connection
/// closes.
async fn stream_pty_output(
    mut rx: broadcast::Receiver<Vec<u8>>,
    session_id: &str,
    writer: Writer,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            result = rx.recv() => {
                let msg = output_push(session_id, result);
                let last = matches!(msg, DaemonMessage::SessionExited { .. });
                let mut w = writer.lock().await;
                if let Err(e) = write_message(&mut *w, &msg).await {
                    debug!(
                        event = "daemon.connection.stream_write_failed",
                        session_id = session_id,
                        error = %e,
                    );
                    break;
                }
                if last {
                    break;
                }
            }
            _ = shutdown.cancelled() => {
                break;
            }
        }
    }
}

/// Message for one receive on a session's output channel.
///
/// A closed channel means the PTY is gone, so the stream ends with
/// `session_exited`.
fn output_push(
    session_id: &str,
    received: Result<Vec<u8>, broadcast::error::RecvError>,
) -> DaemonMessage {
    match received {
        Ok(data) => DaemonMessage::PtyOutput {
            session_id: session_id.to_string(),
            data: encode_bytes(&data),
        },
        Err(broadcast::error::RecvError::Lagged(n)) => {
            warn!(
                event = "daemon.connection.output_lagged",
                session_id = session_id,
                chunks_dropped = n,
            );
            DaemonMessage::PtyOutputDropped {
                session_id: session_id.to_string(),
                chunks_dropped: n,
            }
        }
        Err(broadcast::error::RecvError::Closed) => {
            debug!(event = "daemon.connection.stream_closed", session_id = session_id);
            DaemonMessage::SessionExited {
                session_id: session_id.to_string(),
                exit_code: None,
            }
        }
    }
}

/// Forward lifecycle events to a subscriber.
async fn stream_events(
    mut rx: broadcast::Receiver<DaemonMessage>,
    writer: Writer,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            result = rx.recv() => {
                let Some(msg) = event_push(result) else { break };
                let mut w = writer.lock().await;
                if let Err(e) = write_message(&mut *w, &msg).await {
                    debug!(event = "daemon.connection.event_write_failed", error = %e);
                    break;
                }
            }
            _ = shutdown.cancelled() => {
                break;
            }
        }
    }
}

/// Message for one receive on the event channel. `None` once it closed.
///
/// Missed events become `events_lagged` so the subscriber can resync.
fn event_push(
    received: Result<DaemonMessage, broadcast::error::RecvError>,
) -> Option<DaemonMessage> {
    match received {
        Ok(event) => Some(event),
        Err(broadcast::error::RecvError::Lagged(n)) => {
            warn!(event = "daemon.connection.events_lagged", events_dropped = n);
            Some(DaemonMessage::EventsLagged { events_dropped: n })
        }
        Err(broadcast::error::RecvError::Closed) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termhive_core::sessions::LifecycleState;

    #[tokio::test]
    async fn test_output_lag_reports_chunk_count() {
        let (tx, mut rx) = broadcast::channel::<Vec<u8>>(1);
        for chunk in [b"one".to_vec(), b"two".to_vec(), b"three".to_vec()] {
            tx.send(chunk).unwrap();
        }

        match output_push("s1", rx.recv().await) {
            DaemonMessage::PtyOutputDropped {
                session_id,
                chunks_dropped,
            } => {
                assert_eq!(session_id, "s1");
                assert_eq!(chunks_dropped, 2);
            }
            other => panic!("expected PtyOutputDropped, got {:?}", other),
        }
        match output_push("s1", rx.recv().await) {
            DaemonMessage::PtyOutput { data, .. } => {
                assert_eq!(decode_bytes(&data).unwrap(), b"three");
            }
            other => panic!("expected PtyOutput, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_output_ends_with_exit() {
        let (tx, mut rx) = broadcast::channel::<Vec<u8>>(4);
        drop(tx);
        assert!(matches!(
            output_push("s1", rx.recv().await),
            DaemonMessage::SessionExited { exit_code: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_event_lag_pushes_resync_marker() {
        let (tx, mut rx) = broadcast::channel::<DaemonMessage>(1);
        for _ in 0..3 {
            tx.send(DaemonMessage::StateChanged {
                session_id: "s1".to_string(),
                state: LifecycleState::Busy,
            })
            .unwrap();
        }

        assert!(matches!(
            event_push(rx.recv().await),
            Some(DaemonMessage::EventsLagged { events_dropped: 2 })
        ));
        assert!(matches!(
            event_push(rx.recv().await),
            Some(DaemonMessage::StateChanged { .. })
        ));

        drop(tx);
        assert!(event_push(rx.recv().await).is_none());
    }
}
