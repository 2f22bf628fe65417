//! # Semaphore.
//!
//! A **semaphore** is a non-negative counter together with a queue of
//! sleeping threads. Two atomic operations manipulate it:
//!
//! - [`Semaphore::down`] waits for the counter to become positive, then
//!   decrements it. This is the "P" operation.
//! - [`Semaphore::up`] increments the counter and wakes one waiter, if any.
//!   This is the "V" operation.
//!
//! A semaphore initialized to zero is an event: one thread downs it to wait
//! until another ups it. A semaphore initialized to one is a lock without an
//! owner, which is how [`Lock`] is built. Every sleeping primitive of `synch`
//! bottoms out here; [`Semaphore::down`] is the only place a thread ever
//! goes to sleep.
//!
//! ## Wakeup order
//!
//! [`Semaphore::up`] wakes the waiter of the highest *current* effective
//! priority. A waiter's priority can change after it queued, because the
//! locks it holds elsewhere may receive donations, so the queue is re-sorted
//! at every wakeup rather than kept sorted on insertion. Waiters of equal
//! priority are served in arrival order.
//!
//! ## Interrupt handlers
//!
//! [`Semaphore::try_down`] and [`Semaphore::up`] never sleep, and may be
//! called from an interrupt handler, for instance to signal a thread that
//! waits for a device. [`Semaphore::down`] must not.
//!
//! #### Usage Example
//!
//! ```rust,ignore
//! let done = Arc::new(Semaphore::new(0));
//! let d = done.clone();
//! spawn(move || {
//!     work();
//!     d.up();
//! });
//! done.down(); // Sleeps until `work` has completed.
//! ```
//!
//! [`Lock`]: crate::sync::Lock

use super::{spinlock::SpinLock, wait_queue::WaitQueue};
use crate::{
    interrupt::{InterruptGuard, in_interrupt_context},
    thread::{Priority, ThreadRef, scheduler::scheduler},
};

struct SemaInner {
    value: usize,
    waiters: WaitQueue<ThreadRef>,
}

/// Counting semaphore.
pub struct Semaphore {
    inner: SpinLock<SemaInner>,
}

impl Semaphore {
    /// Creates a new semaphore with the counter set to `value` and no
    /// waiters.
    pub const fn new(value: usize) -> Self {
        Self {
            inner: SpinLock::new(SemaInner {
                value,
                waiters: WaitQueue::new(),
            }),
        }
    }

    /// Waits for the counter to become positive and then decrements it.
    ///
    /// The running thread sleeps while the counter is zero. When it is
    /// woken, the counter is checked again: another thread may have taken
    /// the unit in between.
    ///
    /// # Panics
    /// Panics if called from an interrupt handler.
    #[track_caller]
    pub fn down(&self) {
        assert!(
            !in_interrupt_context(),
            "Semaphore::down called from an interrupt handler."
        );

        let guard = InterruptGuard::new();
        let sched = scheduler();
        loop {
            let mut inner = self.inner.lock();
            if inner.value > 0 {
                inner.value -= 1;
                inner.unlock();
                break;
            }
            inner.waiters.push_back(sched.current());
            inner.unlock();
            sched.block(&guard);
        }
        drop(guard);
    }

    /// Decrements the counter if it is positive, without sleeping.
    ///
    /// Returns true if the counter was decremented. On false, nothing has
    /// changed.
    pub fn try_down(&self) -> bool {
        let guard = InterruptGuard::new();
        let mut inner = self.inner.lock();
        let success = if inner.value > 0 {
            inner.value -= 1;
            true
        } else {
            false
        };
        inner.unlock();
        drop(guard);
        success
    }

    /// Increments the counter and wakes the waiter of highest effective
    /// priority, if any.
    ///
    /// The woken thread runs when the scheduler picks it; if it outranks the
    /// running thread, that happens as soon as interrupts are enabled again.
    pub fn up(&self) {
        let guard = InterruptGuard::new();
        let mut inner = self.inner.lock();
        inner.value += 1;
        let next = inner.waiters.pop_highest();
        inner.unlock();

        if let Some(th) = next {
            log::trace!("sema_up: wake {}({}) at {}", th.name, th.tid, th.priority());
            scheduler().unblock(th);
        }
        drop(guard);
    }

    /// The highest current priority among the sleeping waiters.
    pub(crate) fn highest_waiter(&self) -> Option<Priority> {
        let guard = InterruptGuard::new();
        let inner = self.inner.lock();
        let highest = inner.waiters.highest_priority();
        inner.unlock();
        drop(guard);
        highest
    }

    /// Snapshot of the counter.
    pub fn value(&self) -> usize {
        let guard = InterruptGuard::new();
        let inner = self.inner.lock();
        let value = inner.value;
        inner.unlock();
        drop(guard);
        value
    }
}
