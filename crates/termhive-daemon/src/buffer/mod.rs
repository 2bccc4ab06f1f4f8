//! Eviction Buffer Store: bounded per-session output held while dormant.

mod store;

pub use store::{EvictionBuffer, EvictionBufferStore};
