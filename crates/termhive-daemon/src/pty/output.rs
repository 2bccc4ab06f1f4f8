use std::collections::VecDeque;
use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, warn};

use crate::buffer::EvictionBufferStore;

/// Ring of recent output, replayed to a client on attach.
pub struct ReplayBuffer {
    buffer: VecDeque<u8>,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ReplayBuffer capacity must be non-zero");
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, dropping the oldest bytes once full.
    pub fn push(&mut self, data: &[u8]) {
        let data = if data.len() > self.capacity {
            &data[data.len() - self.capacity..]
        } else {
            data
        };
        let overflow = (self.buffer.len() + data.len()).saturating_sub(self.capacity);
        self.buffer.drain(..overflow);
        self.buffer.extend(data);
    }

    pub fn contents(&self) -> Vec<u8> {
        self.buffer.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Where one chunk of PTY output went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Session is dormant; the chunk went into its eviction buffer.
    Buffered { trimmed: usize },
    /// Session is live; the chunk went to this many subscribers.
    Broadcast { receivers: usize },
}

/// A PTY reader hit EOF or a read error.
#[derive(Debug)]
pub struct PtyExitEvent {
    pub session_id: String,
}

/// Deliver one chunk: replay ring first, then eviction buffer or subscribers.
///
/// The store lock is held across the dormant check and the send, so a
/// restore that flushes under the same lock sees every chunk exactly once.
pub fn route_output(
    session_id: &str,
    data: Vec<u8>,
    replay: &Mutex<ReplayBuffer>,
    store: &Mutex<EvictionBufferStore>,
    output_tx: &broadcast::Sender<Vec<u8>>,
) -> Route {
    match replay.lock() {
        Ok(mut ring) => ring.push(&data),
        Err(e) => {
            error!(
                event = "daemon.pty.replay_lock_poisoned",
                session_id = session_id,
                error = %e,
            );
            let mut ring = e.into_inner();
            ring.clear();
            ring.push(&data);
        }
    }

    let mut buffers = lock_store(store, session_id);
    if let Some(trimmed) = buffers.append(session_id, &data) {
        return Route::Buffered { trimmed };
    }

    // No receivers is normal: nobody may be attached yet.
    let receivers = output_tx.send(data).unwrap_or(0);
    Route::Broadcast { receivers }
}

pub(crate) fn lock_store<'a>(
    store: &'a Mutex<EvictionBufferStore>,
    session_id: &str,
) -> MutexGuard<'a, EvictionBufferStore> {
    match store.lock() {
        Ok(guard) => guard,
        Err(e) => {
            error!(
                event = "daemon.buffer.lock_poisoned",
                session_id = session_id,
                error = %e,
            );
            e.into_inner()
        }
    }
}

/// Read a PTY until EOF on a blocking thread, routing every chunk.
///
/// Sends a [`PtyExitEvent`] when the loop ends.
pub fn spawn_pty_reader(
    session_id: String,
    mut reader: Box<dyn Read + Send>,
    output_tx: broadcast::Sender<Vec<u8>>,
    replay: Arc<Mutex<ReplayBuffer>>,
    store: Arc<Mutex<EvictionBufferStore>>,
    exit_tx: Option<mpsc::UnboundedSender<PtyExitEvent>>,
) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    debug!(event = "daemon.pty.reader_eof", session_id = session_id);
                    break;
                }
                Ok(n) => {
                    route_output(&session_id, buf[..n].to_vec(), &replay, &store, &output_tx);
                }
                Err(e) => {
                    // EIO is how Linux reports a closed PTY slave.
                    debug!(
                        event = "daemon.pty.reader_error",
                        session_id = session_id,
                        error = %e,
                    );
                    break;
                }
            }
        }

        if let Some(tx) = exit_tx
            && tx
                .send(PtyExitEvent {
                    session_id: session_id.clone(),
                })
                .is_err()
        {
            warn!(
                event = "daemon.pty.exit_notification_failed",
                session_id = session_id,
            );
        }
    })
}
