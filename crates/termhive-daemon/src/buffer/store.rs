use std::collections::{HashMap, VecDeque};

use tracing::debug;

/// Output captured for one dormant session, capped at `capacity` bytes.
///
/// Trimming drops the oldest bytes, cutting just past the first newline at
/// or after the last byte that has to go, so the buffer starts on a line.
#[derive(Debug)]
pub struct EvictionBuffer {
    data: VecDeque<u8>,
    /// Tracked length. Always equals `data.len()`.
    size: usize,
    capacity: usize,
}

impl EvictionBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "EvictionBuffer capacity must be non-zero");
        Self {
            data: VecDeque::new(),
            size: 0,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append and trim. Returns how many bytes were dropped.
    pub fn append(&mut self, incoming: &[u8]) -> usize {
        let mut dropped = 0;

        if incoming.len() > self.capacity {
            // Nothing already held can survive. Keep one byte more than fits
            // so the line search below starts at the last byte to remove.
            dropped += self.data.len();
            self.data.clear();
            self.size = 0;

            let skip = incoming.len() - self.capacity - 1;
            dropped += skip;
            self.data.extend(&incoming[skip..]);
            self.size += incoming.len() - skip;
        } else {
            self.data.extend(incoming);
            self.size += incoming.len();
        }

        if self.data.len() > self.capacity {
            let excess = self.data.len() - self.capacity;
            let cut = self
                .data
                .range(excess - 1..)
                .position(|&b| b == b'\n')
                .map(|offset| excess + offset)
                .unwrap_or(excess);
            self.data.drain(..cut);
            self.size -= cut;
            dropped += cut;
        }

        debug_assert_eq!(self.size, self.data.len());
        dropped
    }

    /// Copy of the buffered bytes, oldest first.
    pub fn contents(&self) -> Vec<u8> {
        self.data.iter().copied().collect()
    }

    /// Take the buffered bytes, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<u8> {
        let bytes: Vec<u8> = self.data.drain(..).collect();
        self.size = 0;
        bytes
    }
}

/// All eviction buffers. Presence of a buffer is what makes a session dormant.
#[derive(Debug)]
pub struct EvictionBufferStore {
    buffers: HashMap<String, EvictionBuffer>,
    capacity: usize,
}

impl EvictionBufferStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: HashMap::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Mark `session_id` dormant with an empty buffer.
    ///
    /// Returns false if it already was; the existing buffer is kept.
    pub fn open_for(&mut self, session_id: &str) -> bool {
        if self.buffers.contains_key(session_id) {
            return false;
        }
        self.buffers
            .insert(session_id.to_string(), EvictionBuffer::new(self.capacity));
        true
    }

    /// Buffer output for a dormant session.
    ///
    /// `None` if the session is not dormant; otherwise the bytes trimmed.
    pub fn append(&mut self, session_id: &str, bytes: &[u8]) -> Option<usize> {
        let buffer = self.buffers.get_mut(session_id)?;
        let trimmed = buffer.append(bytes);
        if trimmed > 0 {
            debug!(
                event = "daemon.buffer.trimmed",
                session_id = session_id,
                trimmed_bytes = trimmed,
                buffered_bytes = buffer.len(),
            );
        }
        Some(trimmed)
    }

    /// Remove the buffer and return its bytes. The session is live again.
    pub fn flush_and_clear(&mut self, session_id: &str) -> Option<Vec<u8>> {
        self.buffers.remove(session_id).map(|mut b| b.take())
    }

    /// Drop the buffer without reading it. Returns whether one existed.
    pub fn delete(&mut self, session_id: &str) -> bool {
        self.buffers.remove(session_id).is_some()
    }

    pub fn has(&self, session_id: &str) -> bool {
        self.buffers.contains_key(session_id)
    }

    pub fn size_of(&self, session_id: &str) -> Option<usize> {
        self.buffers.get(session_id).map(EvictionBuffer::len)
    }

    /// Actual bytes held, independent of the tracked size.
    pub fn contents_of(&self, session_id: &str) -> Option<Vec<u8>> {
        self.buffers.get(session_id).map(EvictionBuffer::contents)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
