//! Headless Live Instance that keeps a capped byte transcript.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use tracing::debug;

use super::errors::InstanceError;
use super::instance::{LiveInstance, RestoredSession};
use crate::sessions::SessionId;

/// Source of a session's live output.
pub trait OutputSource: Send + 'static {
    /// Next chunk of output. `Ok(None)` once the source is closed.
    fn next_chunk(&mut self) -> std::io::Result<Option<Vec<u8>>>;

    /// Handle that unblocks a pending `next_chunk` from another thread.
    fn close_handle(&self) -> std::io::Result<Box<dyn CloseHandle>>;
}

pub trait CloseHandle: Send {
    fn close(&self);
}

/// A transcript of everything a session printed, capped to the newest bytes.
pub struct TranscriptInstance {
    id: SessionId,
    transcript: Arc<Mutex<Vec<u8>>>,
    closer: Option<Box<dyn CloseHandle>>,
    reader: Option<JoinHandle<()>>,
}

impl TranscriptInstance {
    /// Start collecting `source` on a reader thread, seeded with `initial`.
    pub fn spawn<S: OutputSource>(
        id: &str,
        initial: Vec<u8>,
        source: S,
        capacity: usize,
    ) -> Result<Self, InstanceError> {
        let closer = source.close_handle().map_err(|e| InstanceError::Mount {
            message: e.to_string(),
        })?;

        let mut seeded = initial;
        cap_front(&mut seeded, capacity);
        let transcript = Arc::new(Mutex::new(seeded));

        let sink = Arc::clone(&transcript);
        let session_id = id.to_string();
        let reader = std::thread::Builder::new()
            .name(format!("transcript-{}", short_id(id)))
            .spawn(move || read_loop(&session_id, source, &sink, capacity))
            .map_err(|e| InstanceError::Mount {
                message: e.to_string(),
            })?;

        Ok(Self {
            id: id.to_string(),
            transcript,
            closer: Some(closer),
            reader: Some(reader),
        })
    }

    /// Mount a restored session: snapshot, then flushed bytes, then live output.
    pub fn from_restored<S: OutputSource>(
        restored: RestoredSession<S>,
        capacity: usize,
    ) -> Result<Self, InstanceError> {
        let initial = restored.replay_bytes();
        Self::spawn(&restored.id, initial, restored.stream, capacity)
    }
}

/// Last `lines` lines of a transcript or snapshot, lossily decoded.
pub fn tail_lines(bytes: &[u8], lines: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

impl LiveInstance for TranscriptInstance {
    fn serialize(&self) -> Result<Vec<u8>, InstanceError> {
        self.transcript
            .lock()
            .map(|t| t.clone())
            .map_err(|_| InstanceError::Serialize {
                message: format!("transcript for '{}' is poisoned", self.id),
            })
    }

    fn cleanup(&mut self) -> Result<(), InstanceError> {
        if let Some(closer) = self.closer.take() {
            closer.close();
        }
        if let Some(reader) = self.reader.take() {
            reader.join().map_err(|_| InstanceError::Cleanup {
                message: format!("reader for '{}' panicked", self.id),
            })?;
        }
        Ok(())
    }
}

impl Drop for TranscriptInstance {
    fn drop(&mut self) {
        if let Some(closer) = self.closer.take() {
            closer.close();
        }
    }
}

fn read_loop<S: OutputSource>(id: &str, mut source: S, sink: &Mutex<Vec<u8>>, capacity: usize) {
    loop {
        match source.next_chunk() {
            Ok(Some(chunk)) => {
                let mut transcript = lock(sink);
                transcript.extend_from_slice(&chunk);
                cap_front(&mut transcript, capacity);
            }
            Ok(None) => break,
            Err(e) => {
                debug!(
                    event = "core.transcript.read_stopped",
                    session_id = id,
                    error = %e,
                );
                break;
            }
        }
    }
}

fn lock(transcript: &Mutex<Vec<u8>>) -> MutexGuard<'_, Vec<u8>> {
    match transcript.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn cap_front(bytes: &mut Vec<u8>, capacity: usize) {
    if bytes.len() > capacity {
        let excess = bytes.len() - capacity;
        bytes.drain(..excess);
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    /// Channel-backed source; `None` on the channel closes it.
    struct ChannelSource {
        rx: mpsc::Receiver<Option<Vec<u8>>>,
        tx: mpsc::Sender<Option<Vec<u8>>>,
    }

    struct ChannelCloser(mpsc::Sender<Option<Vec<u8>>>);

    impl CloseHandle for ChannelCloser {
        fn close(&self) {
            let _ = self.0.send(None);
        }
    }

    impl OutputSource for ChannelSource {
        fn next_chunk(&mut self) -> std::io::Result<Option<Vec<u8>>> {
            Ok(self.rx.recv().ok().flatten())
        }

        fn close_handle(&self) -> std::io::Result<Box<dyn CloseHandle>> {
            Ok(Box::new(ChannelCloser(self.tx.clone())))
        }
    }

    fn channel_source() -> (ChannelSource, mpsc::Sender<Option<Vec<u8>>>) {
        let (tx, rx) = mpsc::channel();
        (
            ChannelSource {
                rx,
                tx: tx.clone(),
            },
            tx,
        )
    }

    fn wait_for(instance: &TranscriptInstance, expected: &[u8]) {
        for _ in 0..200 {
            if instance.serialize().unwrap() == expected {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(instance.serialize().unwrap(), expected);
    }

    #[test]
    fn test_collects_output_after_initial() {
        let (source, tx) = channel_source();
        let mut instance = TranscriptInstance::spawn("s1", b"seed\n".to_vec(), source, 1024).unwrap();
        tx.send(Some(b"line one\n".to_vec())).unwrap();
        wait_for(&instance, b"seed\nline one\n");
        instance.cleanup().unwrap();
    }

    #[test]
    fn test_transcript_is_capped_to_newest_bytes() {
        let (source, tx) = channel_source();
        let mut instance = TranscriptInstance::spawn("s1", b"0123".to_vec(), source, 6).unwrap();
        tx.send(Some(b"456789".to_vec())).unwrap();
        wait_for(&instance, b"456789");
        instance.cleanup().unwrap();
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let (source, _tx) = channel_source();
        let mut instance = TranscriptInstance::spawn("s1", Vec::new(), source, 16).unwrap();
        instance.cleanup().unwrap();
        instance.cleanup().unwrap();
    }

    #[test]
    fn test_from_restored_replays_snapshot_then_flushed() {
        let (source, _tx) = channel_source();
        let restored = RestoredSession {
            id: "s1".to_string(),
            snapshot: b"old\n".to_vec(),
            flushed: b"new\n".to_vec(),
            stream: source,
        };
        let mut instance = TranscriptInstance::from_restored(restored, 64).unwrap();
        assert_eq!(instance.serialize().unwrap(), b"old\nnew\n");
        assert_eq!(tail_lines(&instance.serialize().unwrap(), 1), "new");
        instance.cleanup().unwrap();
    }

    #[test]
    fn test_tail_lines_keeps_last_lines() {
        assert_eq!(tail_lines(b"one\ntwo\nthree\n", 2), "two\nthree");
        assert_eq!(tail_lines(b"only", 5), "only");
        assert_eq!(tail_lines(b"", 3), "");
    }
}
