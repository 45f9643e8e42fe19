//! Coalescing of bursty notifications into one deferred task

use crate::timer::{TimerId, TimerQueue};

/// Collapses repeated triggers into a single pending timer
///
/// Host notifications often arrive in bursts (several views created while a
/// document opens) and the host's own bookkeeping may lag a notification by
/// one scheduling turn. A debouncer keeps at most one task in flight; each new
/// trigger replaces the pending one so the task runs once, after the burst.
#[derive(Debug, Default)]
pub struct Debouncer {
    pending: Option<TimerId>,
    delay_ms: u64,
}

impl Debouncer {
    pub fn new(delay_ms: u64) -> Self {
        Self { pending: None, delay_ms }
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    /// Schedule `task`, replacing any trigger that has not fired yet
    pub fn trigger<T>(&mut self, queue: &mut TimerQueue<T>, task: T) -> TimerId {
        if let Some(previous) = self.pending.take() {
            queue.cancel(previous);
        }
        let id = queue.schedule(self.delay_ms, task);
        self.pending = Some(id);
        id
    }

    /// Record that timer `id` fired
    ///
    /// Returns `false` for a timer this debouncer no longer tracks, which the
    /// caller should treat as superseded.
    pub fn fired(&mut self, id: TimerId) -> bool {
        if self.pending == Some(id) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_collapses_to_one_task() {
        let mut queue = TimerQueue::new();
        let mut debouncer = Debouncer::new(0);

        debouncer.trigger(&mut queue, "refresh");
        debouncer.trigger(&mut queue, "refresh");
        let last = debouncer.trigger(&mut queue, "refresh");

        assert_eq!(queue.pending(), 1);
        let (id, _) = queue.pop_due().unwrap();
        assert_eq!(id, last);
        assert!(debouncer.fired(id));
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn test_stale_timer_is_reported() {
        let mut debouncer = Debouncer::new(5);
        assert!(!debouncer.fired(42));
    }

    #[test]
    fn test_delay_is_applied() {
        let mut queue = TimerQueue::new();
        let mut debouncer = Debouncer::new(5);
        debouncer.trigger(&mut queue, ());
        assert!(queue.pop_due().is_none());
        queue.advance_by(5);
        assert!(queue.pop_due().is_some());
    }
}
