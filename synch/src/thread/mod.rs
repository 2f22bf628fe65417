//! Threads, as seen by the synchronization layer.
//!
//! ## The threading model
//!
//! The kernel consists of a collection of threads, each with its own stack
//! and local state, multiplexed on one CPU by the [`Scheduler`]. This crate
//! does not create, run or destroy threads. It only looks at the few parts of
//! a thread that synchronization depends on:
//!
//! - the **base priority**, set by the thread itself or by kernel policy,
//! - the **effective priority**, which the scheduler uses and which priority
//!   donation raises above the base priority,
//! - the **donation state**: the priorities donated to the thread through
//!   each lock it holds, and the lock it is currently blocked on.
//!
//! [`Scheduler`]: scheduler::Scheduler
pub mod scheduler;

use crate::{
    KernelError,
    interrupt::InterruptGuard,
    sync::{
        LockId,
        donation::DonationState,
        spinlock::SpinLock,
    },
};
use alloc::{string::String, sync::Arc, vec::Vec};
use core::sync::atomic::{AtomicU8, AtomicU64, Ordering};

/// A scheduling priority.
///
/// Priorities range from [`Priority::MIN`] to [`Priority::MAX`]; a larger
/// value is scheduled first.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Priority(u8);

impl Priority {
    /// Lowest priority.
    pub const MIN: Priority = Priority(0);
    /// Default priority of a new thread.
    pub const DEFAULT: Priority = Priority(31);
    /// Highest priority.
    pub const MAX: Priority = Priority(63);

    /// Creates a priority of value `v`.
    ///
    /// # Panics
    /// Panics if `v` is larger than [`Priority::MAX`]. Use
    /// [`Priority::try_from`] for values that are not known to be valid.
    #[track_caller]
    pub const fn new(v: u8) -> Self {
        assert!(v <= Self::MAX.0, "priority out of range");
        Priority(v)
    }

    /// Returns the raw value of this priority.
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for Priority {
    type Error = KernelError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        if v <= Self::MAX.0 {
            Ok(Priority(v))
        } else {
            Err(KernelError::InvalidArgument)
        }
    }
}

impl core::fmt::Display for Priority {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A shared handle to a [`Thread`].
pub type ThreadRef = Arc<Thread>;

/// A thread abstraction.
pub struct Thread {
    /// Thread id
    pub tid: u64,
    /// Thread name
    pub name: String,
    base_priority: AtomicU8,
    priority: AtomicU8,
    pub(crate) donation: SpinLock<DonationState>,
}

impl Thread {
    /// Creates a thread descriptor named `name` with base priority
    /// `priority`.
    ///
    /// This only allocates the descriptor; the scheduler owning it decides
    /// when the thread runs.
    pub fn new<I>(name: I, priority: Priority) -> ThreadRef
    where
        alloc::string::String: core::convert::From<I>,
    {
        static TID: AtomicU64 = AtomicU64::new(0);
        let tid = TID.fetch_add(1, Ordering::SeqCst);

        Arc::new(Self {
            tid,
            name: String::from(name),
            base_priority: AtomicU8::new(priority.get()),
            priority: AtomicU8::new(priority.get()),
            donation: SpinLock::new(DonationState::new()),
        })
    }

    /// The effective priority of this thread, including donations.
    pub fn priority(&self) -> Priority {
        Priority(self.priority.load(Ordering::SeqCst))
    }

    /// The priority of this thread without any donation.
    pub fn base_priority(&self) -> Priority {
        Priority(self.base_priority.load(Ordering::SeqCst))
    }

    pub(crate) fn set_effective_priority(&self, priority: Priority) {
        self.priority.store(priority.get(), Ordering::SeqCst);
    }

    /// Changes the base priority of this thread.
    ///
    /// While donations are outstanding, the effective priority does not drop
    /// below the highest of them; the new base priority takes full effect
    /// once the donating locks are released.
    ///
    /// The caller must have interrupts disabled; outside this crate the
    /// base priority is changed through [`set_priority`].
    pub(crate) fn set_base_priority(&self, priority: Priority) {
        self.base_priority.store(priority.get(), Ordering::SeqCst);
        let state = self.donation.lock();
        let effective = match state.highest_donation() {
            Some(donated) => donated.max(priority),
            None => priority,
        };
        state.unlock();
        self.set_effective_priority(effective);
    }

    /// Snapshot of the donations this thread received: for each held lock
    /// that carries a donation, the donated priority.
    pub fn donations(&self) -> Vec<(LockId, Priority)> {
        let state = self.donation.lock();
        let result = state.records();
        state.unlock();
        result
    }

    /// The lock this thread is blocked on, if any.
    pub fn waiting_on(&self) -> Option<LockId> {
        let state = self.donation.lock();
        let result = state.waiting_on();
        state.unlock();
        result
    }
}

impl core::fmt::Debug for Thread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Thread")
            .field("tid", &self.tid)
            .field("name", &self.name)
            .field("priority", &self.priority())
            .field("base_priority", &self.base_priority())
            .finish()
    }
}

/// Returns the running thread.
pub fn current() -> ThreadRef {
    scheduler::scheduler().current()
}

/// Returns the effective priority of the running thread.
pub fn get_priority() -> Priority {
    current().priority()
}

/// Sets the base priority of the running thread.
///
/// If this lowers the effective priority below that of a ready thread, the
/// scheduler switches to it when interrupts are re-enabled at the end of
/// this call.
pub fn set_priority(priority: Priority) {
    let guard = InterruptGuard::new();
    let th = current();
    th.set_base_priority(priority);
    log::trace!(
        "{}({}): base priority {} (effective {})",
        th.name,
        th.tid,
        priority,
        th.priority()
    );
    drop(guard);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_range() {
        assert_eq!(Priority::try_from(0u8), Ok(Priority::MIN));
        assert_eq!(Priority::try_from(63u8), Ok(Priority::MAX));
        assert_eq!(Priority::try_from(64u8), Err(KernelError::InvalidArgument));
        assert_eq!(Priority::default(), Priority::DEFAULT);
        assert!(Priority::new(40) > Priority::DEFAULT);
    }

    #[test]
    fn base_priority_change_keeps_donation() {
        let th = Thread::new("t", Priority::new(10));
        th.set_base_priority(Priority::new(20));
        assert_eq!(th.priority(), Priority::new(20));
        assert_eq!(th.base_priority(), Priority::new(20));

        let lock = crate::sync::Lock::new();
        crate::sync::donation::donate(Priority::new(30), th.clone(), lock.id());
        th.set_base_priority(Priority::new(5));
        assert_eq!(th.priority(), Priority::new(30));
        assert_eq!(th.base_priority(), Priority::new(5));
        assert_eq!(th.donations(), [(lock.id(), Priority::new(30))]);
    }
}
