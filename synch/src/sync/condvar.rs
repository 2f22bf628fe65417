//! # Condition Variable.
//!
//! A **condition variable** lets a thread sleep until some condition on
//! shared state becomes true. The state is protected by a [`Lock`], and a
//! condition variable is always used together with that lock: the waiter
//! checks the condition with the lock held and, if it does not hold yet,
//! calls [`Condvar::wait`], which releases the lock and sleeps in one step.
//! Another thread changes the state under the same lock and calls
//! [`Condvar::signal`] or [`Condvar::broadcast`].
//!
//! The condition variables of `synch` follow **Mesa** semantics: waking up and
//! re-acquiring the lock are not one atomic step, so by the time a woken
//! waiter holds the lock again another thread may have made the condition
//! false. The waiter must check again, in a loop:
//!
//! ```rust,ignore
//! lock.acquire();
//! while queue.is_empty() {
//!     not_empty.wait(&lock);
//! }
//! let item = queue.pop();
//! lock.release();
//! ```
//!
//! [`Condvar::wait_while`] runs this loop for a [`Mutex`].
//!
//! Each waiter sleeps on a private [`Semaphore`]. A signal wakes the waiter
//! whose thread has the highest effective priority at the moment of the
//! signal.
//!
//! One lock may be used with any number of condition variables, but one
//! condition variable must only ever be used with one lock.

use super::{
    Lock, Mutex, MutexGuard, Semaphore,
    spinlock::SpinLock,
    wait_queue::{WaitQueue, Waiter},
};
use crate::{
    interrupt::{InterruptGuard, in_interrupt_context},
    thread::{Priority, ThreadRef, current},
};
use alloc::sync::Arc;

struct CondWaiter {
    sema: Arc<Semaphore>,
    owner: ThreadRef,
}

impl Waiter for CondWaiter {
    fn priority(&self) -> Priority {
        self.owner.priority()
    }
}

/// A Condition Variable
///
/// Functions of this type block the current **thread**. Using one condition
/// variable with several locks is a bug.
#[derive(Default)]
pub struct Condvar {
    waiters: SpinLock<WaitQueue<CondWaiter>>,
}

impl Condvar {
    /// Creates a new condition variable which is ready to be waited on and
    /// signaled.
    pub const fn new() -> Self {
        Self {
            waiters: SpinLock::new(WaitQueue::new()),
        }
    }

    /// Releases `lock`, sleeps until signaled, and re-acquires `lock`.
    ///
    /// The lock is held again when this returns, but the condition the
    /// caller waited for may be false: check it again.
    ///
    /// # Panics
    /// Panics if the running thread does not hold `lock`, or if called from
    /// an interrupt handler.
    #[track_caller]
    pub fn wait(&self, lock: &Lock) {
        assert!(
            !in_interrupt_context(),
            "Condvar::wait called from an interrupt handler."
        );
        assert!(
            lock.held_by_current(),
            "Condvar::wait without holding the lock."
        );

        let sema = Arc::new(Semaphore::new(0));
        let guard = InterruptGuard::new();
        let mut waiters = self.waiters.lock();
        waiters.push_back(CondWaiter {
            sema: sema.clone(),
            owner: current(),
        });
        waiters.unlock();
        drop(guard);

        lock.release();
        sema.down();
        lock.acquire();
    }

    /// Blocks the current thread while `predicate` returns `true`.
    ///
    /// Locks `mutex`, then waits on this condition variable for as long as
    /// the predicate holds on the protected data, re-checking after each
    /// wakeup. Returns the guard once the predicate is false.
    ///
    /// ```rust,ignore
    /// let guard = condvar.wait_while(&mutex, |state| state.count == 0);
    /// ```
    #[track_caller]
    pub fn wait_while<'a, T>(
        &self,
        mutex: &'a Mutex<T>,
        mut predicate: impl FnMut(&mut T) -> bool,
    ) -> MutexGuard<'a, T> {
        let mut guard = mutex.lock();
        while predicate(&mut guard) {
            self.wait(mutex.raw());
        }
        guard
    }

    /// Wakes the waiter of highest effective priority, if any.
    ///
    /// Signals are not buffered: with nobody waiting, this does nothing.
    ///
    /// # Panics
    /// Panics if the running thread does not hold `lock`, or if called from
    /// an interrupt handler.
    #[track_caller]
    pub fn signal(&self, lock: &Lock) {
        assert!(
            !in_interrupt_context(),
            "Condvar::signal called from an interrupt handler."
        );
        assert!(
            lock.held_by_current(),
            "Condvar::signal without holding the lock."
        );
        self.wake_one();
    }

    /// Wakes all waiters, highest effective priority first.
    ///
    /// # Panics
    /// As [`Condvar::signal`].
    #[track_caller]
    pub fn broadcast(&self, lock: &Lock) {
        assert!(
            !in_interrupt_context(),
            "Condvar::broadcast called from an interrupt handler."
        );
        assert!(
            lock.held_by_current(),
            "Condvar::broadcast without holding the lock."
        );
        while self.wake_one() {}
    }

    fn wake_one(&self) -> bool {
        let guard = InterruptGuard::new();
        let mut waiters = self.waiters.lock();
        let next = waiters.pop_highest();
        waiters.unlock();
        drop(guard);

        match next {
            Some(waiter) => {
                log::trace!(
                    "cond_signal: wake {}({}) at {}",
                    waiter.owner.name,
                    waiter.owner.tid,
                    waiter.owner.priority()
                );
                waiter.sema.up();
                true
            }
            None => false,
        }
    }
}
