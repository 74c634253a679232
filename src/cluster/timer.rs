//! Virtual clock and one-shot deferred tasks
//!
//! The simulation never sleeps on a wall clock. Deferred work is queued with
//! a due time on a millisecond counter; whoever owns the queue advances the
//! clock and receives the tasks that became due, in due order. Tasks that are
//! due at the same instant come out in submission order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

struct Entry<T> {
    fire_at: u64,
    seq: u64,
    task: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    // Reversed so the max-heap pops the earliest entry first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Queue of one-shot tasks keyed by virtual due time
pub struct TimerQueue<T> {
    now_ms: u64,
    next_seq: u64,
    heap: BinaryHeap<Entry<T>>,
}

impl<T> TimerQueue<T> {
    /// Create an empty queue at time zero
    pub fn new() -> Self {
        Self {
            now_ms: 0,
            next_seq: 0,
            heap: BinaryHeap::new(),
        }
    }

    /// Current virtual time in milliseconds
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Queue a task to fire `delay_ms` from now; returns its due time
    pub fn schedule(&mut self, delay_ms: u64, task: T) -> u64 {
        let fire_at = self.now_ms.saturating_add(delay_ms);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry { fire_at, seq, task });
        fire_at
    }

    /// Pop the earliest task due at or before `target_ms`, moving the clock to
    /// its due time. Returns `None` (and leaves the clock alone) if none is due.
    pub fn pop_due(&mut self, target_ms: u64) -> Option<(u64, T)> {
        if !self.heap.peek().is_some_and(|e| e.fire_at <= target_ms) {
            return None;
        }
        let entry = self.heap.pop()?;
        self.now_ms = self.now_ms.max(entry.fire_at);
        Some((entry.fire_at, entry.task))
    }

    /// Set the clock without firing anything; used after draining `pop_due`
    pub fn settle_at(&mut self, target_ms: u64) {
        self.now_ms = self.now_ms.max(target_ms);
    }

    /// Due time of the next queued task
    pub fn next_due(&self) -> Option<u64> {
        self.heap.peek().map(|e| e.fire_at)
    }

    /// Number of queued tasks
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Iterate queued tasks with their due times (unordered)
    pub fn iter(&self) -> impl Iterator<Item = (u64, &T)> {
        self.heap.iter().map(|e| (e.fire_at, &e.task))
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
