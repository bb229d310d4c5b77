//! Timeout tracker for pending requests.
//!
//! A min-heap of `(deadline, insertion seq, request id)` marks. Marks are
//! never removed when a request is answered; the sweep hands back every due
//! id and the caller skips ids that are no longer pending.

use courier_wire::RequestId;
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct TimeoutMark {
    deadline: Instant,
    seq: u64,
    request_id: RequestId,
}

#[derive(Debug, Default)]
struct Marks {
    heap: BinaryHeap<Reverse<TimeoutMark>>,
    next_seq: u64,
}

/// Ordered deadlines of pending requests.
#[derive(Debug, Default)]
pub struct TimeoutTracker {
    marks: Mutex<Marks>,
}

impl TimeoutTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a mark. Equal deadlines sweep in insertion order.
    pub fn arm(&self, deadline: Instant, request_id: RequestId) {
        let mut marks = self.marks.lock();
        let seq = marks.next_seq;
        marks.next_seq += 1;
        marks.heap.push(Reverse(TimeoutMark {
            deadline,
            seq,
            request_id,
        }));
    }

    /// Remove and return every id whose deadline is at or before `now`, in
    /// deadline order.
    pub fn sweep(&self, now: Instant) -> Vec<RequestId> {
        let mut marks = self.marks.lock();
        let mut due = Vec::new();
        while let Some(Reverse(mark)) = marks.heap.peek() {
            if mark.deadline > now {
                break;
            }
            due.push(mark.request_id);
            marks.heap.pop();
        }
        due
    }

    /// Earliest armed deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.marks.lock().heap.peek().map(|Reverse(m)| m.deadline)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.marks.lock().heap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.marks.lock().heap.is_empty()
    }

    pub fn clear(&self) {
        self.marks.lock().heap.clear();
    }
}
