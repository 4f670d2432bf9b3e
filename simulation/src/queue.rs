//! Discrete-event queue
//!
//! Events are delivered in time order. Events scheduled for the same instant
//! are delivered in the order they were pushed.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use qnet_core::SimTime;

struct Entry<E> {
    at: SimTime,
    seq: u64,
    event: E,
}

impl<E> PartialEq for Entry<E> {
    fn eq(&self, other: &Self) -> bool {
        (self.at, self.seq) == (other.at, other.seq)
    }
}

impl<E> Eq for Entry<E> {}

impl<E> Ord for Entry<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

impl<E> PartialOrd for Entry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Time-ordered event queue with a simulated clock
pub struct Simulator<E> {
    heap: BinaryHeap<Reverse<Entry<E>>>,
    seq: u64,
    now: SimTime,
    end: SimTime,
}

impl<E> Simulator<E> {
    /// A queue that stops delivering events after `end`
    pub fn new(end: SimTime) -> Self {
        Self { heap: BinaryHeap::new(), seq: 0, now: SimTime::ZERO, end }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn end(&self) -> SimTime {
        self.end
    }

    /// Schedule `event` at `at`; times in the past are clamped to now
    pub fn push(&mut self, at: SimTime, event: E) {
        let at = at.max(self.now);
        self.heap.push(Reverse(Entry { at, seq: self.seq, event }));
        self.seq += 1;
    }

    /// Time of the next event within the horizon
    pub fn peek_time(&self) -> Option<SimTime> {
        self.heap.peek().map(|Reverse(e)| e.at).filter(|at| *at <= self.end)
    }

    /// Advance the clock to the next event and return it
    pub fn pop(&mut self) -> Option<(SimTime, E)> {
        self.peek_time()?;
        let Reverse(entry) = self.heap.pop()?;
        self.now = entry.at;
        Some((entry.at, entry.event))
    }

    /// Move the clock forward without delivering anything
    pub fn advance_to(&mut self, at: SimTime) {
        self.now = self.now.max(at);
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
