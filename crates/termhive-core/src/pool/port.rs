use crate::daemon::SupervisorError;

/// Bytes flushed from a dormant session plus a stream already subscribed
/// to its live output.
#[derive(Debug)]
pub struct Restoration<S> {
    pub flushed: Vec<u8>,
    pub stream: S,
}

/// The supervisor operations the pool drives.
///
/// Implemented over the daemon socket by
/// [`DaemonSupervisor`](crate::daemon::DaemonSupervisor) and by in-memory
/// fakes in tests.
pub trait SupervisorPort {
    /// Stream handed to a restored instance.
    type Stream;

    /// Open the eviction buffer and stop emitting output for `id`.
    fn begin_buffering(&mut self, id: &str) -> Result<(), SupervisorError>;

    /// Subscribe first, then flush and clear the eviction buffer.
    fn restore(&mut self, id: &str) -> Result<Restoration<Self::Stream>, SupervisorError>;

    /// Terminate the PTY and release all supervisor state for `id`.
    fn close(&mut self, id: &str) -> Result<(), SupervisorError>;
}
