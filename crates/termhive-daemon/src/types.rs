use std::path::PathBuf;

use termhive_core::config::{Config, TermhiveConfig, defaults};

/// Everything the daemon needs at startup.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,
    pub pid_path: PathBuf,
    /// Cap on output buffered for one dormant session.
    pub eviction_buffer_size: usize,
    /// Recent output replayed to a client on attach.
    pub replay_buffer_size: usize,
    /// Chunks a slow subscriber may lag before it is told output was dropped.
    pub broadcast_capacity: usize,
    pub shutdown_timeout_secs: u64,
    /// Launched for interactive-agent sessions without an explicit command.
    pub agent_command: String,
    pub agent_args: Vec<String>,
}

impl DaemonConfig {
    pub fn from_config(config: &TermhiveConfig, runtime: &Config) -> Self {
        Self {
            socket_path: config.daemon.resolve_socket_path(runtime),
            pid_path: runtime.pid_path(),
            eviction_buffer_size: config.buffer.eviction_capacity_bytes,
            replay_buffer_size: config.buffer.replay_capacity_bytes,
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            shutdown_timeout_secs: config.daemon.shutdown_timeout_secs,
            agent_command: config.agent.command.clone(),
            agent_args: config.agent.args.clone(),
        }
    }
}

const DEFAULT_BROADCAST_CAPACITY: usize = 256;

impl Default for DaemonConfig {
    fn default() -> Self {
        let runtime = Config::new();
        Self {
            socket_path: runtime.socket_path(),
            pid_path: runtime.pid_path(),
            eviction_buffer_size: defaults::default_eviction_capacity_bytes(),
            replay_buffer_size: defaults::default_replay_capacity_bytes(),
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            shutdown_timeout_secs: defaults::default_shutdown_timeout_secs(),
            agent_command: defaults::default_agent_command(),
            agent_args: Vec::new(),
        }
    }
}
