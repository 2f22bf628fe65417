//! # Mutex.
//!
//! A [`Mutex`] couples a [`Lock`] with the data it protects, so that the data
//! can only be reached while the lock is held. Waiting for a mutex donates
//! priority exactly as waiting for the underlying [`Lock`] does.
//!
//! Like the [`SpinLock`] guard, a [`MutexGuard`] is not released on drop. It
//! must be released with [`MutexGuard::unlock`]; dropping it otherwise
//! panics and names the place where it was locked. This keeps every release
//! point of a kernel lock visible in the source.
//!
//! [`SpinLock`]: super::spinlock::SpinLock

use super::Lock;
use crate::WouldBlock;
use core::{
    cell::UnsafeCell,
    marker::PhantomData,
    ops::{Deref, DerefMut},
};

/// A mutual exclusion primitive useful for protecting shared data
///
/// This mutex will block threads waiting for the lock to become available.
/// The mutex can be created via a [`new`] constructor. Each mutex has a type
/// parameter which represents the data that it is protecting. The data can
/// only be accessed through the guards returned from [`lock`] and
/// [`try_lock`], which guarantees that the data is only ever accessed when
/// the mutex is locked.
///
/// [`new`]: Self::new
/// [`lock`]: Self::lock
/// [`try_lock`]: Self::try_lock
///
/// # Examples
///
/// ```rust,ignore
/// let data = Arc::new(Mutex::new(0));
///
/// for _ in 0..N {
///     let data = Arc::clone(&data);
///     spawn(move || {
///         let mut data = data.lock();
///         *data += 1;
///         // the lock must be "explicitly" unlocked.
///         data.unlock();
///     });
/// }
/// ```
pub struct Mutex<T> {
    lock: Lock,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Creates a new mutex in an unlocked state ready for use.
    pub fn new(t: T) -> Mutex<T> {
        Mutex {
            lock: Lock::new(),
            data: UnsafeCell::new(t),
        }
    }

    /// Acquires a mutex, blocking the current thread until it is able to do
    /// so.
    ///
    /// Upon returning, the thread is the only thread with the lock held.
    ///
    /// # Panics
    /// Panics if the running thread already holds the mutex.
    #[track_caller]
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.lock.acquire();
        MutexGuard {
            caller: core::panic::Location::caller(),
            mutex: self,
            _not_send: PhantomData,
        }
    }

    /// Attempts to acquire this lock.
    ///
    /// This function does not block.
    ///
    /// # Errors
    ///
    /// If the mutex could not be acquired because it is already locked, then
    /// this call will return the [`WouldBlock`] error.
    #[track_caller]
    pub fn try_lock(&self) -> Result<MutexGuard<'_, T>, WouldBlock> {
        if self.lock.try_acquire() {
            Ok(MutexGuard {
                caller: core::panic::Location::caller(),
                mutex: self,
                _not_send: PhantomData,
            })
        } else {
            Err(WouldBlock)
        }
    }

    /// The [`Lock`] underneath, for use with a [`Condvar`].
    ///
    /// [`Condvar`]: super::Condvar
    pub fn raw(&self) -> &Lock {
        &self.lock
    }

    /// Consumes this mutex, returning the underlying data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Mutex<T> {
        Mutex::new(Default::default())
    }
}

/// An implementation of a "scoped lock" of a mutex. When this structure is
/// dropped (falls out of scope) without unlock, panic occurs.
///
/// The data protected by the mutex can be accessed through this guard via
/// its [`Deref`] and [`DerefMut`] implementations.
///
/// This structure is created by the [`lock`] and [`try_lock`] methods on
/// [`Mutex`].
///
/// [`lock`]: Mutex::lock
/// [`try_lock`]: Mutex::try_lock
pub struct MutexGuard<'a, T: 'a> {
    caller: &'static core::panic::Location<'static>,
    mutex: &'a Mutex<T>,
    _not_send: PhantomData<*const ()>,
}

unsafe impl<T: Sync> Sync for MutexGuard<'_, T> {}

impl<T> MutexGuard<'_, T> {
    /// Releases the underlying [`Mutex`].
    ///
    /// As the guard does **not** automatically release the lock on drop,
    /// the caller must explicitly invoke [`unlock`] to mark the lock
    /// as available again.
    ///
    /// [`unlock`]: MutexGuard::unlock
    #[track_caller]
    pub fn unlock(self) {
        self.mutex.lock.release();
        core::mem::forget(self);
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        panic!(
            "`.unlock()` must be explicitly called for MutexGuard.
The mutex is locked at {:?}.",
            self.caller
        );
    }
}
