//! Cooperative timer queue
//!
//! Models the host's "invoke this callback once after N milliseconds"
//! primitive as a queue that the host pumps from its own event loop. Tasks are
//! plain values (usually an enum naming the step to run), so running a task
//! never needs to borrow the queue and the state it mutates at the same time.
//!
//! Tasks become due in order of their due time; tasks due at the same time run
//! in scheduling order. A delay of zero means "next scheduler turn".

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Unique timer identifier
pub type TimerId = u64;

/// Timer queue statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerStats {
    /// Total timers scheduled
    pub scheduled: u64,

    /// Timers that came due and were handed out
    pub fired: u64,

    /// Timers cancelled before they came due
    pub cancelled: u64,
}

impl TimerStats {
    /// Number of timers still waiting
    pub fn pending(&self) -> u64 {
        self.scheduled - self.fired - self.cancelled
    }
}

struct Timer<T> {
    id: TimerId,
    due_ms: u64,
    insertion_order: u64,
    task: T,
}

impl<T> PartialEq for Timer<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Timer<T> {}

impl<T> PartialOrd for Timer<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Timer<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max heap: the earliest due time, then the earliest
        // insertion, must compare greatest.
        match other.due_ms.cmp(&self.due_ms) {
            Ordering::Equal => other.insertion_order.cmp(&self.insertion_order),
            ord => ord,
        }
    }
}

/// Single-threaded queue of delayed tasks driven by a host clock
///
/// # Example
///
/// ```
/// use docpanel_scheduler::TimerQueue;
///
/// let mut queue = TimerQueue::new();
/// queue.schedule(10, "later");
/// queue.schedule(0, "now");
///
/// assert_eq!(queue.pop_due().map(|(_, task)| task), Some("now"));
/// assert!(queue.pop_due().is_none());
///
/// queue.advance_by(10);
/// assert_eq!(queue.pop_due().map(|(_, task)| task), Some("later"));
/// ```
pub struct TimerQueue<T> {
    heap: BinaryHeap<Timer<T>>,
    cancelled: HashSet<TimerId>,
    now_ms: u64,
    next_id: TimerId,
    next_insertion: u64,
    stats: TimerStats,
}

impl<T> TimerQueue<T> {
    /// Create an empty queue with its clock at zero
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            cancelled: HashSet::new(),
            now_ms: 0,
            next_id: 1,
            next_insertion: 0,
            stats: TimerStats::default(),
        }
    }

    /// Current value of the queue's clock in milliseconds
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Move the clock to `now_ms`
    ///
    /// The clock never runs backwards; an earlier value is ignored.
    pub fn advance_to(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
    }

    /// Move the clock forward by `delta_ms`
    pub fn advance_by(&mut self, delta_ms: u64) {
        self.now_ms = self.now_ms.saturating_add(delta_ms);
    }

    /// Schedule `task` to become due `delay_ms` from now
    pub fn schedule(&mut self, delay_ms: u64, task: T) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        let insertion_order = self.next_insertion;
        self.next_insertion += 1;

        self.heap.push(Timer {
            id,
            due_ms: self.now_ms.saturating_add(delay_ms),
            insertion_order,
            task,
        });
        self.stats.scheduled += 1;
        id
    }

    /// Cancel a pending timer
    ///
    /// Returns `false` if the timer already fired, was already cancelled, or
    /// never existed.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        if self.cancelled.contains(&id) || !self.heap.iter().any(|timer| timer.id == id) {
            return false;
        }
        self.cancelled.insert(id);
        self.stats.cancelled += 1;
        true
    }

    /// Take the next task whose due time has been reached
    pub fn pop_due(&mut self) -> Option<(TimerId, T)> {
        loop {
            let due = self.heap.peek()?.due_ms;
            if due > self.now_ms {
                return None;
            }
            let timer = self.heap.pop()?;
            if self.cancelled.remove(&timer.id) {
                continue;
            }
            self.stats.fired += 1;
            return Some((timer.id, timer.task));
        }
    }

    /// Due time of the next live timer, if any
    pub fn next_due_ms(&self) -> Option<u64> {
        self.heap
            .iter()
            .filter(|timer| !self.cancelled.contains(&timer.id))
            .map(|timer| timer.due_ms)
            .min()
    }

    /// Number of timers still waiting
    pub fn pending(&self) -> usize {
        self.heap.len() - self.cancelled.len()
    }

    /// Check if no timers are waiting
    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Drop every pending timer
    pub fn clear(&mut self) {
        self.stats.cancelled += self.pending() as u64;
        self.heap.clear();
        self.cancelled.clear();
    }

    /// Get queue statistics
    pub fn stats(&self) -> TimerStats {
        self.stats
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
