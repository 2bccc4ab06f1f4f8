//! Default implementations for configuration types.
//!
//! This module contains all `Default` implementations and helper functions
//! for providing default values in serde deserialization.

use crate::config::types::{AgentConfig, BufferConfig, Config, DaemonSettings, PoolConfig};
use std::path::PathBuf;

/// Smallest pool size the Session Pool accepts.
pub const MIN_POOL_SIZE: usize = 2;

/// Largest pool size the Session Pool accepts.
pub const MAX_POOL_SIZE: usize = 20;

pub fn default_pool_max_size() -> usize {
    5
}

/// Returns the per-session eviction buffer cap (1 MiB).
pub fn default_eviction_capacity_bytes() -> usize {
    1024 * 1024
}

pub fn default_replay_capacity_bytes() -> usize {
    64 * 1024
}

pub fn default_request_timeout_secs() -> u64 {
    10
}

pub fn default_shutdown_timeout_secs() -> u64 {
    5
}

pub fn default_agent_command() -> String {
    "claude".to_string()
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: default_pool_max_size(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            eviction_capacity_bytes: default_eviction_capacity_bytes(),
            replay_capacity_bytes: default_replay_capacity_bytes(),
        }
    }
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            socket_path: None,
            request_timeout_secs: default_request_timeout_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: default_agent_command(),
            args: Vec::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let termhive_dir = match std::env::var_os("TERMHIVE_HOME") {
            Some(dir) => PathBuf::from(dir),
            None => match dirs::home_dir() {
                Some(home) => home.join(".termhive"),
                None => {
                    eprintln!(
                        "Warning: Could not find home directory. Set HOME environment variable. \
                        Using fallback directory."
                    );
                    std::env::temp_dir().join(".termhive")
                }
            },
        };

        Self {
            termhive_dir,
            log_level: std::env::var("TERMHIVE_LOG_LEVEL").unwrap_or("info".to_string()),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn socket_path(&self) -> PathBuf {
        self.termhive_dir.join("daemon.sock")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.termhive_dir.join("daemon.pid")
    }
}

impl DaemonSettings {
    /// Resolve the socket, preferring the configured override.
    pub fn resolve_socket_path(&self, runtime: &Config) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(|| runtime.socket_path())
    }
}
