//! termhive-daemon: the PTY supervisor.
//!
//! Owns one PTY child per session, buffers the output of dormant sessions
//! and serves the JSONL protocol from `termhive_core::protocol` on a Unix
//! socket.

pub mod buffer;
pub mod client;
pub mod errors;
pub mod protocol;
pub mod pty;
pub mod server;
pub mod session;
pub mod types;

pub use errors::DaemonError;
pub use server::run_server;
pub use types::DaemonConfig;
