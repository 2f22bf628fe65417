//! Priority-ordered queue of sleeping waiters.
//!
//! Waiters are appended in arrival order and only sorted when one of them is
//! about to be woken. A waiter's priority can change while it sleeps, because
//! priority is donated to the locks it holds elsewhere, so ordering at
//! insertion time would go stale.

use crate::thread::{Priority, Thread, ThreadRef};
use alloc::collections::VecDeque;

/// Something that sleeps in a [`WaitQueue`].
pub trait Waiter {
    /// The priority this waiter is served at, read when the queue is sorted.
    fn priority(&self) -> Priority;
}

impl Waiter for ThreadRef {
    fn priority(&self) -> Priority {
        Thread::priority(self)
    }
}

/// An ordered container of waiters.
pub struct WaitQueue<W: Waiter> {
    waiters: VecDeque<W>,
}

impl<W: Waiter> WaitQueue<W> {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        Self {
            waiters: VecDeque::new(),
        }
    }

    /// Appends `waiter` at the back of the queue.
    pub fn push_back(&mut self, waiter: W) {
        self.waiters.push_back(waiter);
    }

    /// Sorts the waiters by their current priority, highest first.
    ///
    /// The sort is stable: waiters of equal priority keep their arrival
    /// order.
    pub fn sort(&mut self) {
        self.waiters
            .make_contiguous()
            .sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    /// Re-sorts the queue and removes the waiter of highest priority.
    pub fn pop_highest(&mut self) -> Option<W> {
        self.sort();
        self.waiters.pop_front()
    }

    /// Returns true if nobody is waiting.
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Number of waiters.
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// The current priority of the highest waiter.
    pub fn highest_priority(&self) -> Option<Priority> {
        self.waiters.iter().map(Waiter::priority).max()
    }
}

impl<W: Waiter> Default for WaitQueue<W> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_by_current_priority() {
        let mut queue = WaitQueue::new();
        let low = Thread::new("low", Priority::new(10));
        let mid = Thread::new("mid", Priority::new(20));
        let high = Thread::new("high", Priority::new(30));
        queue.push_back(low.clone());
        queue.push_back(mid.clone());
        queue.push_back(high.clone());

        // `low` receives a donation after it queued.
        low.set_effective_priority(Priority::new(40));
        assert_eq!(queue.highest_priority(), Some(Priority::new(40)));

        assert_eq!(queue.pop_highest().unwrap().tid, low.tid);
        assert_eq!(queue.pop_highest().unwrap().tid, high.tid);
        assert_eq!(queue.pop_highest().unwrap().tid, mid.tid);
        assert!(queue.pop_highest().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn equal_priorities_keep_arrival_order() {
        let mut queue = WaitQueue::new();
        let threads = (0..5)
            .map(|i| Thread::new(alloc::format!("t{i}"), Priority::DEFAULT))
            .collect::<alloc::vec::Vec<_>>();
        for th in threads.iter() {
            queue.push_back(th.clone());
        }
        assert_eq!(queue.len(), 5);
        for th in threads.iter() {
            assert_eq!(queue.pop_highest().unwrap().tid, th.tid);
        }
    }
}
