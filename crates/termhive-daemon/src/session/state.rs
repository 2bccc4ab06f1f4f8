use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::pty::output::ReplayBuffer;
use crate::protocol::SessionInfo;
use termhive_core::Session;

/// Identifies one client connection.
pub type ClientId = u64;

/// Runtime state the daemon keeps next to a session's registry record.
pub struct DaemonSession {
    id: String,
    created_at: DateTime<Utc>,
    working_directory: String,
    pid: Option<u32>,
    replay: Arc<Mutex<ReplayBuffer>>,
    output_tx: broadcast::Sender<Vec<u8>>,
    clients: HashSet<ClientId>,
}

impl DaemonSession {
    pub fn new(
        id: String,
        working_directory: String,
        replay_capacity: usize,
        broadcast_capacity: usize,
    ) -> Self {
        let (output_tx, _) = broadcast::channel(broadcast_capacity);
        Self {
            id,
            created_at: Utc::now(),
            working_directory,
            pid: None,
            replay: Arc::new(Mutex::new(ReplayBuffer::new(replay_capacity))),
            output_tx,
            clients: HashSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn working_directory(&self) -> &str {
        &self.working_directory
    }

    pub fn set_pid(&mut self, pid: Option<u32>) {
        self.pid = pid;
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Handle the PTY reader feeds.
    pub fn shared_replay(&self) -> Arc<Mutex<ReplayBuffer>> {
        Arc::clone(&self.replay)
    }

    pub fn output_sender(&self) -> broadcast::Sender<Vec<u8>> {
        self.output_tx.clone()
    }

    pub fn subscribe_output(&self) -> broadcast::Receiver<Vec<u8>> {
        self.output_tx.subscribe()
    }

    pub fn replay_contents(&self) -> Vec<u8> {
        match self.replay.lock() {
            Ok(ring) => ring.contents(),
            Err(e) => e.into_inner().contents(),
        }
    }

    pub fn attach_client(&mut self, client_id: ClientId) {
        self.clients.insert(client_id);
    }

    pub fn detach_client(&mut self, client_id: ClientId) {
        self.clients.remove(&client_id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Wire view combining the registry record with runtime state.
    pub fn to_session_info(&self, record: &Session, buffered: Option<usize>) -> SessionInfo {
        SessionInfo {
            id: record.id.clone(),
            project_id: record.project_id.clone(),
            worktree_id: record.worktree_id.clone(),
            kind: record.kind,
            state: record.state,
            title: record.title.clone(),
            last_activity: record.last_activity,
            created_at: self.created_at,
            pid: self.pid,
            dormant: buffered.is_some(),
            buffered_bytes: buffered.unwrap_or(0),
            client_count: self.client_count(),
        }
    }
}
