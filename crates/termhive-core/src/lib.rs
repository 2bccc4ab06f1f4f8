//! termhive-core: session bookkeeping for many terminals across projects
//!
//! This library holds everything the UI-facing side of termhive needs to
//! decide which terminal sessions are materialized and which are dormant.
//! The PTY processes themselves live in `termhive-daemon`.
//!
//! # Main Entry Points
//!
//! - [`sessions`] - Session Registry and lifecycle state machine
//! - [`pool`] - Session Pool, eviction policy, Live Instance Adapter
//! - [`daemon`] - Synchronous client and supervisor port for the daemon
//! - [`protocol`] - Wire messages shared with the daemon
//! - [`config`] - Configuration management

pub mod config;
pub mod daemon;
pub mod errors;
pub mod events;
pub mod logging;
pub mod pool;
pub mod protocol;
pub mod sessions;

// Re-export commonly used types at crate root for convenience
pub use config::TermhiveConfig;
pub use daemon::{DaemonSupervisor, SupervisorError};
pub use pool::{
    EvictionPass, InstanceError, LiveInstance, PoolError, RestoredSession, SessionPool,
    SupervisorPort, TranscriptInstance,
};
pub use protocol::{ClientMessage, DaemonMessage, SessionInfo};
pub use sessions::{LifecycleState, Session, SessionError, SessionId, SessionKind, SessionRegistry};

// Re-export logging initialization
pub use logging::init_logging;
