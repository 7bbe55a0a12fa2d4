//! Time-ordered future event queue
//!
//! The world schedules everything that will happen — predicted collisions
//! and spirit timeouts — as events on this queue, then pops them in time
//! order. Events at the same time pop in insertion order; replays depend on
//! that tie-break being stable.
//!
//! Hit events are cheap to discard, so nothing is ever removed when a body's
//! trajectory changes. A stale event (its recorded path generations no
//! longer match the live bodies) is dropped at pop time by the world.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::body::{BodyId, PathId};
use super::spirit::{SpiritId, TimeoutValue};

/// A predicted collision between two bodies.
///
/// Valid only while both referenced path generations are still live.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitEvent {
    pub time: f64,
    pub body_a: BodyId,
    pub path_a: PathId,
    pub body_b: BodyId,
    pub path_b: PathId,
    /// Unit contact normal pointing from `body_a` toward `body_b`.
    pub normal: DVec2,
}

/// A spirit-requested callback at a fixed sim time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeoutEvent {
    pub time: f64,
    pub spirit_id: SpiritId,
    /// Opaque to the engine; the spirit gets it back verbatim.
    pub value: TimeoutValue,
}

/// A scheduled occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WorldEvent {
    Hit(HitEvent),
    Timeout(TimeoutEvent),
}

impl WorldEvent {
    /// Sim time this event is due.
    #[inline]
    pub fn time(&self) -> f64 {
        match self {
            WorldEvent::Hit(e) => e.time,
            WorldEvent::Timeout(e) => e.time,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    event: WorldEvent,
    seq: u64,
}

impl Entry {
    /// (time, seq), the full ordering key.
    fn key(&self) -> (f64, u64) {
        (self.event.time(), self.seq)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the std max-heap pops the earliest entry first.
        let (ta, sa) = self.key();
        let (tb, sb) = other.key();
        ta.total_cmp(&tb).then(sa.cmp(&sb)).reverse()
    }
}

/// Min-queue of future events, FIFO among equal times.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an event.
    pub fn insert(&mut self, event: WorldEvent) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry { event, seq });
    }

    /// Earliest pending event, if any.
    pub fn peek_min(&self) -> Option<&WorldEvent> {
        self.heap.peek().map(|e| &e.event)
    }

    /// Remove and return the earliest pending event.
    pub fn pop_min(&mut self) -> Option<WorldEvent> {
        self.heap.pop().map(|e| e.event)
    }

    /// Keep only events matching the predicate.
    ///
    /// Used when a spirit dies, to drop its pending timeouts.
    pub fn retain(&mut self, mut pred: impl FnMut(&WorldEvent) -> bool) {
        self.heap.retain(|e| pred(&e.event));
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn timeout(time: f64, value: u64) -> WorldEvent {
        WorldEvent::Timeout(TimeoutEvent {
            time,
            spirit_id: SpiritId(1),
            value,
        })
    }

    #[test]
    fn test_pop_order_with_fifo_ties() {
        let mut q = EventQueue::new();
        // Inserted as [1, 1, 2, 0.5]; the two t=1 events must keep
        // insertion order.
        q.insert(timeout(1.0, 10));
        q.insert(timeout(1.0, 11));
        q.insert(timeout(2.0, 12));
        q.insert(timeout(0.5, 13));

        let popped: Vec<u64> = std::iter::from_fn(|| q.pop_min())
            .map(|e| match e {
                WorldEvent::Timeout(t) => t.value,
                WorldEvent::Hit(_) => unreachable!(),
            })
            .collect();
        assert_eq!(popped, vec![13, 10, 11, 12]);
    }

    #[test]
    fn test_peek_does_not_remove() {
        let mut q = EventQueue::new();
        q.insert(timeout(3.0, 1));
        assert_eq!(q.peek_min().map(WorldEvent::time), Some(3.0));
        assert_eq!(q.len(), 1);
        assert!(q.pop_min().is_some());
        assert!(q.is_empty());
    }

    #[test]
    fn test_retain_drops_spirit_timeouts() {
        let mut q = EventQueue::new();
        for i in 0..4 {
            q.insert(WorldEvent::Timeout(TimeoutEvent {
                time: i as f64,
                spirit_id: SpiritId(i % 2),
                value: i,
            }));
        }
        q.retain(|e| !matches!(e, WorldEvent::Timeout(t) if t.spirit_id == SpiritId(0)));
        assert_eq!(q.len(), 2);
        while let Some(e) = q.pop_min() {
            match e {
                WorldEvent::Timeout(t) => assert_eq!(t.spirit_id, SpiritId(1)),
                WorldEvent::Hit(_) => unreachable!(),
            }
        }
    }

    proptest! {
        #[test]
        fn prop_pop_times_nondecreasing(times in prop::collection::vec(0.0f64..1000.0, 0..64)) {
            let mut q = EventQueue::new();
            for (i, t) in times.iter().enumerate() {
                q.insert(timeout(*t, i as u64));
            }
            let mut last = f64::NEG_INFINITY;
            while let Some(e) = q.pop_min() {
                prop_assert!(e.time() >= last);
                last = e.time();
            }
        }
    }
}
