//! # Lock with priority donation.
//!
//! A [`Lock`] is a [`Semaphore`] of initial value one that additionally
//! remembers its **holder**. Only the holder may release it, and a thread
//! may not acquire a lock it already holds: both are kernel bugs and panic.
//!
//! ## Priority inversion
//!
//! Consider three threads L, M and H of low, medium and high priority. L
//! holds a lock that H needs. H blocks, and from then on M, which is ready
//! and outranks L, keeps the CPU. L never runs, never releases the lock, and
//! H waits for M although H has the higher priority. This is *priority
//! inversion*.
//!
//! ## Donation
//!
//! When a thread blocks on a held lock whose holder has a lower effective
//! priority, it **donates** its priority to the holder for as long as the
//! holder keeps that lock. In the example above L runs at H's priority,
//! overtakes M, releases the lock, and falls back to its own priority.
//!
//! Donation is transitive. If H blocks on a lock held by M, and M is itself
//! blocked on a lock held by L, both M and L are raised to H's priority. The
//! chain is followed through each thread's *waiting edge*, the single lock
//! it is blocked on, for any length.
//!
//! A thread can receive donations through several locks at once. It keeps a
//! *donation record* for each such lock, holding the highest priority that
//! flowed through it. Releasing a lock removes its record, and the effective
//! priority becomes the highest remaining record, or the base priority when
//! none remain.
//!
//! Releasing a lock only lowers the releasing thread. A thread further along
//! the chain keeps the priority it was lent until it releases its own lock.
//!
//! Donation can be disabled by the scheduler through
//! [`Scheduler::priority_donation`]; the waiting edge is still recorded.
//!
//! #### Usage Example
//!
//! ```rust,ignore
//! static FILE_LOCK: spin::Lazy<Lock> = spin::Lazy::new(Lock::new);
//!
//! FILE_LOCK.acquire();
//! let n = file.read(buf);
//! FILE_LOCK.release();
//! ```
//!
//! [`Scheduler::priority_donation`]: crate::thread::scheduler::Scheduler::priority_donation

use super::{
    Semaphore,
    donation::{self, HolderCell},
    spinlock::SpinLock,
};
use crate::{
    interrupt::{InterruptGuard, in_interrupt_context},
    thread::{Thread, ThreadRef, current, scheduler::scheduler},
};
use alloc::sync::Arc;

/// Identity of a [`Lock`].
///
/// Donation records are keyed by it. It stays the same when the lock is
/// moved.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockId(usize);

impl LockId {
    pub(crate) fn of(cell: &Arc<HolderCell>) -> Self {
        LockId(Arc::as_ptr(cell) as usize)
    }
}

impl core::fmt::Debug for LockId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "LockId({:#x})", self.0)
    }
}

/// A sleeping mutual exclusion lock with priority donation.
pub struct Lock {
    sema: Semaphore,
    holder: Arc<HolderCell>,
}

impl Lock {
    /// Creates an unheld lock.
    pub fn new() -> Self {
        Self {
            sema: Semaphore::new(1),
            holder: Arc::new(SpinLock::new(None)),
        }
    }

    /// The identity of this lock.
    pub fn id(&self) -> LockId {
        LockId::of(&self.holder)
    }

    fn holder(&self) -> Option<ThreadRef> {
        let holder = self.holder.lock();
        let th = holder.clone();
        holder.unlock();
        th
    }

    fn set_holder(&self, th: Option<ThreadRef>) {
        let mut holder = self.holder.lock();
        *holder = th;
        holder.unlock();
    }

    fn is_held_by(&self, th: &Thread) -> bool {
        self.holder()
            .is_some_and(|holder| core::ptr::eq(Arc::as_ptr(&holder), th))
    }

    /// Acquires the lock, sleeping until it becomes available.
    ///
    /// If the lock is held by a thread of lower effective priority, the
    /// running thread donates its priority to the holder and down the
    /// holder's wait-for chain before going to sleep.
    ///
    /// # Panics
    /// Panics if the running thread already holds the lock, or if called
    /// from an interrupt handler.
    #[track_caller]
    pub fn acquire(&self) {
        assert!(
            !in_interrupt_context(),
            "Lock::acquire called from an interrupt handler."
        );

        let guard = InterruptGuard::new();
        let me = current();
        if let Some(holder) = self.holder() {
            if Arc::ptr_eq(&holder, &me) {
                panic!("{}({}) acquires a lock it already holds.", me.name, me.tid);
            }
            donation::begin_wait(&me, self.id(), &self.holder);
            if scheduler().priority_donation() && holder.priority() < me.priority() {
                donation::donate(me.priority(), holder, self.id());
            }
        }

        self.sema.down();

        donation::end_wait(&me, self.id());
        self.set_holder(Some(me));
        drop(guard);
    }

    /// Tries to acquire the lock without sleeping.
    ///
    /// Returns true on success. Never donates: nobody waits, so there is no
    /// inversion to correct.
    ///
    /// # Panics
    /// Panics if the running thread already holds the lock.
    #[track_caller]
    pub fn try_acquire(&self) -> bool {
        let guard = InterruptGuard::new();
        let me = current();
        assert!(
            !self.is_held_by(&me),
            "{}({}) acquires a lock it already holds.",
            me.name,
            me.tid
        );
        let success = self.sema.try_down();
        if success {
            self.set_holder(Some(me));
        }
        drop(guard);
        success
    }

    /// Releases the lock.
    ///
    /// Priority donated through this lock is given back first, then the
    /// waiter of highest priority, if any, is woken.
    ///
    /// # Panics
    /// Panics if the running thread does not hold the lock.
    #[track_caller]
    pub fn release(&self) {
        let guard = InterruptGuard::new();
        let me = current();
        assert!(
            self.is_held_by(&me),
            "{}({}) releases a lock it does not hold.",
            me.name,
            me.tid
        );
        donation::restore(&me, self.id());
        self.set_holder(None);
        self.sema.up();
        drop(guard);
    }

    /// Passes the lock from the running thread to `to` without waking any
    /// waiter.
    ///
    /// Donations to the running thread through this lock are given back, and
    /// the waiters of the lock donate to `to` instead. The reader-writer lock
    /// uses this to keep its write gate with a reader that is still inside.
    ///
    /// # Panics
    /// Panics if the running thread does not hold the lock.
    #[track_caller]
    pub(crate) fn hand_over(&self, to: ThreadRef) {
        let guard = InterruptGuard::new();
        let me = current();
        assert!(
            self.is_held_by(&me),
            "{}({}) hands over a lock it does not hold.",
            me.name,
            me.tid
        );
        donation::restore(&me, self.id());
        self.set_holder(Some(to.clone()));
        if scheduler().priority_donation() {
            if let Some(highest) = self.sema.highest_waiter() {
                if to.priority() < highest {
                    donation::donate(highest, to, self.id());
                }
            }
        }
        drop(guard);
    }


    /// Returns true if the running thread holds this lock.
    ///
    /// Whether some *other* thread holds the lock cannot be asked: the answer
    /// could be stale before the caller looks at it.
    pub fn held_by_current(&self) -> bool {
        let guard = InterruptGuard::new();
        let held = self.is_held_by(&current());
        drop(guard);
        held
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}
