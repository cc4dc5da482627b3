//! Event Buffer - bounded, deduplicated store of recent events
//!
//! The buffer keeps the most recent `capacity` distinct events. Older
//! events are overwritten in ring order once the buffer is full.

mod ring;

use std::sync::Arc;

use thiserror::Error;

use crate::types::Event;

pub use ring::RingEventBuffer;

/// Errors raised when constructing a buffer
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffer capacity must be at least 1")]
    ZeroCapacity,
}

/// Basic interface to a store of events
pub trait EventBuffer: Send + Sync {
    /// Add an event; a no-op when its identity is already resident
    fn add(&self, event: Arc<Event>);

    /// Resident events in ring order (oldest to newest)
    fn snapshot(&self) -> Vec<Arc<Event>>;

    /// Maximum number of events the buffer holds
    fn capacity(&self) -> usize;

    /// Number of distinct resident events
    fn size(&self) -> usize;

    /// Visit every resident event in ring order.
    ///
    /// The visitor runs against a snapshot, so a slow visitor never blocks
    /// writers.
    fn visit(&self, visit: &mut dyn FnMut(&Event)) {
        for event in self.snapshot() {
            visit(&event);
        }
    }
}
