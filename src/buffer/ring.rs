//! Ring-backed deduplicating event buffer

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{BufferError, EventBuffer};
use crate::types::Event;

struct RingState {
    /// Fixed-size slots; `None` until first written
    slots: Vec<Option<Arc<Event>>>,
    /// Next slot to write; also the oldest occupied slot once full
    cursor: usize,
    /// Identities currently resident
    resident: HashSet<String>,
}

/// A simple deduplicating buffer storing events in a ring.
///
/// The ring structure means old events are overwritten by new ones.
/// One lock guards both the slots and the dedup index.
pub struct RingEventBuffer {
    state: Mutex<RingState>,
    capacity: usize,
}

impl RingEventBuffer {
    /// Create a buffer holding at most `capacity` events
    pub fn new(capacity: usize) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::ZeroCapacity);
        }

        Ok(Self {
            state: Mutex::new(RingState {
                slots: vec![None; capacity],
                cursor: 0,
                resident: HashSet::with_capacity(capacity),
            }),
            capacity,
        })
    }

    /// Whether an event with this identity is resident
    pub fn contains(&self, uid: &str) -> bool {
        self.state.lock().resident.contains(uid)
    }
}

impl EventBuffer for RingEventBuffer {
    fn add(&self, event: Arc<Event>) {
        let mut state = self.state.lock();
        if state.resident.contains(event.uid()) {
            return;
        }

        let cursor = state.cursor;
        if let Some(evicted) = state.slots[cursor].take() {
            state.resident.remove(evicted.uid());
        }

        state.resident.insert(event.uid().to_string());
        state.slots[cursor] = Some(event);
        state.cursor = (cursor + 1) % self.capacity;
    }

    fn snapshot(&self) -> Vec<Arc<Event>> {
        let state = self.state.lock();
        let mut events = Vec::with_capacity(state.resident.len());

        // Walking from the cursor visits the oldest slot first
        for offset in 0..self.capacity {
            let index = (state.cursor + offset) % self.capacity;
            if let Some(event) = &state.slots[index] {
                events.push(Arc::clone(event));
            }
        }

        events
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn size(&self) -> usize {
        self.state.lock().resident.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventType;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    fn event(uid: &str) -> Arc<Event> {
        Arc::new(Event::new(uid, EventType::Normal, format!("event {}", uid)))
    }

    fn uids(buffer: &RingEventBuffer) -> Vec<String> {
        buffer.snapshot().iter().map(|e| e.uid().to_string()).collect()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(RingEventBuffer::new(0).err(), Some(BufferError::ZeroCapacity));
    }

    #[test]
    fn test_deduplication() {
        let buffer = RingEventBuffer::new(4).unwrap();
        let e = event("same");
        buffer.add(Arc::clone(&e));
        buffer.add(Arc::clone(&e));
        buffer.add(e);

        let mut visited = 0;
        buffer.visit(&mut |_: &Event| visited += 1);
        assert_eq!(visited, 1);
        assert_eq!(buffer.size(), 1);
    }

    #[test]
    fn test_size_capped_at_capacity() {
        let buffer = RingEventBuffer::new(4).unwrap();
        for i in 0..10 {
            buffer.add(event(&i.to_string()));
        }

        assert_eq!(buffer.capacity(), 4);
        assert_eq!(buffer.size(), 4);
        assert_eq!(uids(&buffer), vec!["6", "7", "8", "9"]);
    }

    #[test]
    fn test_overflow_evicts_earliest() {
        let buffer = RingEventBuffer::new(3).unwrap();
        for uid in ["a", "b", "c", "d"] {
            buffer.add(event(uid));
        }

        assert_eq!(buffer.size(), 3);
        assert!(!buffer.contains("a"));
        assert_eq!(uids(&buffer), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_capacity_two_scenario() {
        let buffer = RingEventBuffer::new(2).unwrap();
        buffer.add(event("1"));
        buffer.add(event("2"));
        buffer.add(event("3"));
        assert_eq!(uids(&buffer), vec!["2", "3"]);

        // Re-adding a resident identity is not a recency refresh
        buffer.add(event("2"));
        assert_eq!(buffer.size(), 2);
        assert_eq!(uids(&buffer), vec!["2", "3"]);
    }

    #[test]
    fn test_readd_does_not_reorder_partial_ring() {
        let buffer = RingEventBuffer::new(5).unwrap();
        buffer.add(event("x"));
        buffer.add(event("y"));
        buffer.add(event("x"));
        buffer.add(event("z"));

        assert_eq!(uids(&buffer), vec!["x", "y", "z"]);
        assert_eq!(buffer.size(), 3);
    }

    #[test]
    fn test_evicted_identity_can_return() {
        let buffer = RingEventBuffer::new(2).unwrap();
        buffer.add(event("a"));
        buffer.add(event("b"));
        buffer.add(event("c"));
        buffer.add(event("a"));

        assert_eq!(uids(&buffer), vec!["c", "a"]);
    }

    #[test]
    fn test_slow_visitor_does_not_block_writers() {
        let buffer = Arc::new(RingEventBuffer::new(4).unwrap());
        buffer.add(event("first"));

        let started = Arc::new(AtomicBool::new(false));
        let reader = {
            let buffer = Arc::clone(&buffer);
            let started = Arc::clone(&started);
            thread::spawn(move || {
                let mut seen = Vec::new();
                buffer.visit(&mut |e: &Event| {
                    started.store(true, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(300));
                    seen.push(e.uid().to_string());
                });
                seen
            })
        };

        while !started.load(Ordering::SeqCst) {
            thread::yield_now();
        }

        // Visitor is mid-flight; this must not wait for it
        let begin = std::time::Instant::now();
        buffer.add(event("second"));
        assert!(begin.elapsed() < Duration::from_millis(200));
        assert_eq!(buffer.size(), 2);

        // The visitor saw the snapshot taken before the write
        assert_eq!(reader.join().unwrap(), vec!["first"]);
    }

    #[test]
    fn test_concurrent_add_and_snapshot() {
        let buffer = Arc::new(RingEventBuffer::new(16).unwrap());
        let mut handles = Vec::new();

        for t in 0..4 {
            let buffer = Arc::clone(&buffer);
            handles.push(thread::spawn(move || {
                for i in 0..500 {
                    buffer.add(event(&format!("{}-{}", t, i % 50)));
                }
            }));
        }

        for _ in 0..2 {
            let buffer = Arc::clone(&buffer);
            handles.push(thread::spawn(move || {
                for _ in 0..200 {
                    let snapshot = buffer.snapshot();
                    let mut ids: Vec<_> = snapshot.iter().map(|e| e.uid().to_string()).collect();
                    let len = ids.len();
                    ids.sort();
                    ids.dedup();
                    assert_eq!(ids.len(), len, "snapshot held a duplicate identity");
                    assert!(len <= 16);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(buffer.size(), 16);
        assert_eq!(buffer.snapshot().len(), 16);
    }
}
