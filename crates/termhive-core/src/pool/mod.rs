//! Client-side Session Pool and the Live Instance Adapter.
//!
//! The pool decides which sessions stay materialized. It talks to the PTY
//! supervisor only through [`SupervisorPort`] and to the renderer only
//! through [`LiveInstance`].

mod errors;
mod eviction;
mod instance;
mod manager;
mod port;
mod transcript;

pub use errors::{InstanceError, PoolError};
pub use eviction::{EvictionPass, ReconcileReport};
pub use instance::{LiveInstance, RestoredSession};
pub use manager::{Mount, SessionPool};
pub use port::{Restoration, SupervisorPort};
pub use transcript::{CloseHandle, OutputSource, TranscriptInstance, tail_lines};
