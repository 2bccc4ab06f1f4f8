use super::errors::InstanceError;
use crate::sessions::SessionId;

/// What the pool needs from a materialized terminal.
///
/// Implemented by whatever renders the session. The pool never sees the
/// concrete type.
pub trait LiveInstance {
    /// Capture the visible screen and history.
    ///
    /// Must leave the instance untouched when it fails.
    fn serialize(&self) -> Result<Vec<u8>, InstanceError>;

    /// Release rendering resources. Calling it twice must be harmless.
    fn cleanup(&mut self) -> Result<(), InstanceError>;
}

/// Everything needed to rebuild a live instance for a dormant session.
///
/// `stream` is already subscribed to the session's output, so nothing
/// emitted after `flushed` was captured can be missed.
#[derive(Debug)]
pub struct RestoredSession<S> {
    pub id: SessionId,
    pub snapshot: Vec<u8>,
    pub flushed: Vec<u8>,
    pub stream: S,
}

impl<S> RestoredSession<S> {
    /// Snapshot followed by the output buffered while dormant.
    pub fn replay_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.snapshot.len() + self.flushed.len());
        bytes.extend_from_slice(&self.snapshot);
        bytes.extend_from_slice(&self.flushed);
        bytes
    }
}

/// Run `cleanup()` so that neither an error nor a panic escapes.
///
/// Returns whether cleanup reported success.
pub(crate) fn cleanup_isolated(id: &str, instance: &mut dyn LiveInstance) -> bool {
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| instance.cleanup()));
    match outcome {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::error!(
                event = "core.pool.cleanup_failed",
                session_id = id,
                error = %e,
            );
            false
        }
        Err(_) => {
            tracing::error!(
                event = "core.pool.cleanup_panicked",
                session_id = id,
            );
            false
        }
    }
}
