//! Configuration type definitions for termhive.
//!
//! # Example Configuration
//!
//! ```toml
//! [pool]
//! max_size = 5
//!
//! [buffer]
//! eviction_capacity_bytes = 1048576
//! replay_capacity_bytes = 65536
//!
//! [daemon]
//! request_timeout_secs = 10
//!
//! [agent]
//! command = "claude"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Runtime configuration derived from the environment, not from config files.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory for all termhive data (default: ~/.termhive)
    pub termhive_dir: PathBuf,
    /// Log level for the application
    pub log_level: String,
}

/// Main configuration loaded from TOML config files.
///
/// Project config values override user config values.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TermhiveConfig {
    /// Session Pool sizing
    #[serde(default)]
    pub pool: PoolConfig,

    /// Per-session buffer limits
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Daemon connection settings
    #[serde(default)]
    pub daemon: DaemonSettings,

    /// Command used for interactive-agent sessions
    #[serde(default)]
    pub agent: AgentConfig,
}

/// Session Pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of live terminal instances. Clamped to `[2, 20]`.
    /// Default: 5.
    #[serde(default = "super::defaults::default_pool_max_size")]
    pub max_size: usize,
}

/// Buffer capacity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Cap on output buffered for one dormant session.
    /// Default: 1 MiB.
    #[serde(default = "super::defaults::default_eviction_capacity_bytes")]
    pub eviction_capacity_bytes: usize,

    /// Size of the recent-output ring replayed when a client attaches.
    /// Default: 64 KiB.
    #[serde(default = "super::defaults::default_replay_capacity_bytes")]
    pub replay_capacity_bytes: usize,
}

/// Daemon connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSettings {
    /// Socket override. Defaults to `<termhive_dir>/daemon.sock`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,

    /// Client-side bound on a single request round trip.
    /// Default: 10 seconds.
    #[serde(default = "super::defaults::default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// How long the daemon waits for sessions to stop on shutdown.
    /// Default: 5 seconds.
    #[serde(default = "super::defaults::default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

/// Agent command configuration for interactive-agent sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Executable launched for agent sessions.
    #[serde(default = "super::defaults::default_agent_command")]
    pub command: String,

    /// Extra arguments passed to the agent.
    #[serde(default)]
    pub args: Vec<String>,
}
