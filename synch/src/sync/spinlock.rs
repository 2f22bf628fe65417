//! Uniprocessor spinlock.
//!
//! On a single CPU, mutual exclusion between threads comes from disabling
//! interrupts: with interrupts off the running thread cannot be preempted, so
//! no other thread can touch the shared state. The [`SpinLock`] of this
//! module therefore does **not** disable interrupts itself. The caller must
//! already hold an [`InterruptGuard`]; the lock only guarantees, and checks,
//! exclusive access to the data it protects.
//!
//! In particular, a [`SpinLockGuard`] must never be held across
//! [`Scheduler::block`]: the next thread to run would spin forever on it.
//!
//! [`InterruptGuard`]: crate::interrupt::InterruptGuard
//! [`Scheduler::block`]: crate::thread::scheduler::Scheduler::block

use crate::WouldBlock;
use core::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};
use crossbeam_utils::Backoff;

/// A mutual exclusion primitive useful for protecting shared data
///
/// The spinlock can be created via a [`new`] constructor. Each spinlock has a
/// type parameter which represents the data that it is protecting. The data can
/// only be accessed through the guards returned from [`lock`] and
/// [`try_lock`], which guarantees that the data is only ever accessed when the
/// spinlock is locked.
///
/// [`new`]: Self::new
/// [`lock`]: Self::lock
/// [`try_lock`]: Self::try_lock
///
/// # Examples
///
/// ```
/// use synch::sync::spinlock::SpinLock;
///
/// let data = SpinLock::new(0);
/// let mut guard = data.lock();
/// *guard += 1;
/// // the lock must be "explicitly" unlocked.
/// guard.unlock();
/// ```
pub struct SpinLock<T: ?Sized> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for SpinLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Creates a new spinlock in an unlocked state ready for use.
    #[inline]
    pub const fn new(t: T) -> SpinLock<T> {
        SpinLock {
            data: UnsafeCell::new(t),
            locked: AtomicBool::new(false),
        }
    }

    /// Consumes this spinlock, returning the underlying data.
    pub fn into_inner(self) -> T
    where
        T: Sized,
    {
        self.data.into_inner()
    }
}

impl<T: ?Sized> SpinLock<T> {
    /// Acquires a spinlock, spinning until it is able to do so.
    ///
    /// Upon returning, the caller is the only one with the lock held. When the
    /// guard goes out of scope without [`SpinLockGuard::unlock`], panic occurs.
    ///
    /// Locking a spinlock which the caller already holds never returns.
    #[track_caller]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let backoff = Backoff::new();
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            backoff.snooze();
        }

        SpinLockGuard {
            caller: core::panic::Location::caller(),
            lock: self,
        }
    }

    /// Attempts to acquire this lock.
    ///
    /// # Errors
    ///
    /// If the spinlock could not be acquired because it is already locked, then
    /// this call will return the [`WouldBlock`] error.
    #[track_caller]
    pub fn try_lock(&self) -> Result<SpinLockGuard<'_, T>, WouldBlock> {
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Ok(SpinLockGuard {
                caller: core::panic::Location::caller(),
                lock: self,
            })
        } else {
            Err(WouldBlock)
        }
    }
}

impl<T: Default> Default for SpinLock<T> {
    /// Creates a `SpinLock<T>`, with the `Default` value for T.
    fn default() -> SpinLock<T> {
        SpinLock::new(Default::default())
    }
}

impl<T: ?Sized> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

/// An implementation of a "scoped lock" of a spinlock. When this structure
/// is dropped (falls out of scope) without unlock, panic occurs.
///
/// The lock must be explicitly unlocked by [`unlock`] method.
///
/// This structure is created by the [`lock`] and [`try_lock`] methods on
/// [`SpinLock`].
///
/// [`lock`]: SpinLock::lock
/// [`try_lock`]: SpinLock::try_lock
/// [`unlock`]: Self::unlock
pub struct SpinLockGuard<'a, T: ?Sized + 'a> {
    caller: &'static core::panic::Location<'static>,
    lock: &'a SpinLock<T>,
}

unsafe impl<T: ?Sized + Sync> Sync for SpinLockGuard<'_, T> {}

impl<T: ?Sized> SpinLockGuard<'_, T> {
    /// Releases the underlying [`SpinLock`].
    ///
    /// As the guard does **not** automatically release the lock on drop,
    /// the caller must explicitly invoke [`unlock`] to mark the lock
    /// as available again.
    ///
    /// [`unlock`]: Self::unlock
    pub fn unlock(self) {
        self.lock.locked.store(false, Ordering::Release);
        core::mem::forget(self);
    }
}

impl<T: ?Sized> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        panic!(
            "`.unlock()` must be explicitly called before dropping SpinLockGuard.
The lock is held at {:?}.",
            self.caller
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_lock_fails_while_held() {
        let lock = SpinLock::new(1);
        let mut guard = lock.lock();
        assert_eq!(lock.try_lock().err(), Some(WouldBlock));
        *guard += 1;
        guard.unlock();

        let guard = lock.try_lock().ok().unwrap();
        assert_eq!(*guard, 2);
        guard.unlock();
        assert_eq!(lock.into_inner(), 2);
    }

    #[test]
    #[should_panic(expected = "must be explicitly called")]
    fn dropping_guard_panics() {
        let lock = SpinLock::new(());
        let _guard = lock.lock();
    }
}
