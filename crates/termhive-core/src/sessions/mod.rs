//! Session Registry and lifecycle state machine.

pub mod errors;
pub mod registry;
pub mod types;

pub use errors::SessionError;
pub use registry::SessionRegistry;
pub use types::{LifecycleState, Session, SessionId, SessionKind};
