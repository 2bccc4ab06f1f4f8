//! Async JSONL framing. Message types live in `termhive_core::protocol`.

pub mod codec;

pub use termhive_core::protocol::{ClientMessage, DaemonMessage, SessionInfo};
