//! Synchronous access to the termhive daemon.
//!
//! Uses `std::os::unix::net::UnixStream`, no tokio. Every request opens a
//! fresh connection; streaming requests keep theirs open afterwards.

mod client;
mod errors;
mod stream;

pub use client::{CreateSessionRequest, DaemonSupervisor};
pub use errors::SupervisorError;
pub use stream::{EventStream, OutputStream, SocketCloser};
