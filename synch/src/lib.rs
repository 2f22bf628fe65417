//! # synch: Synchronization Layer of a Uniprocessor Teaching Kernel
//!
//! This crate provides the sleeping synchronization primitives of a small,
//! preemptive, single-CPU kernel:
//!
//! - [`Semaphore`]: a non-negative counter with a queue of sleeping threads.
//! - [`Lock`]: a semaphore of initial value one, with an owner and **priority
//!   donation**.
//! - [`Condvar`]: a Mesa-style condition variable used together with a
//!   [`Lock`].
//! - [`RwLock`]: a reader-writer lock composed from two [`Lock`]s.
//! - [`Mutex`]: a data-carrying wrapper over [`Lock`].
//!
//! ## Priority donation
//!
//! A high-priority thread blocked on a lock held by a low-priority thread
//! would otherwise wait for every medium-priority thread in the system. To
//! bound this *priority inversion*, a thread that blocks on a held lock
//! donates its priority to the holder, and, if the holder is itself blocked
//! on another lock, to that lock's holder and so on down the wait-for chain.
//! Each thread remembers which lock every donation came through, so that
//! releasing a lock gives back exactly the priority that was lent through it.
//! See [`sync::lock`] for the details.
//!
//! ## The scheduler
//!
//! This crate does not own threads. The enclosing kernel provides them
//! through the [`Scheduler`] trait: it knows the current thread, can put it
//! to sleep and wake it up, and can disable and restore interrupts. Before
//! any primitive is used, the kernel installs its scheduler:
//!
//! ```rust,ignore
//! synch::SystemConfigurationBuilder::new().set_scheduler(&MY_SCHEDULER)?;
//! ```
//!
//! ## Atomicity
//!
//! There is exactly one CPU. All bookkeeping inside this crate is done with
//! interrupts disabled through an [`InterruptGuard`], which restores the
//! previous interrupt level when dropped. The only point where a thread can
//! go to sleep is [`Semaphore::down`].
//!
//! [`Semaphore`]: sync::Semaphore
//! [`Semaphore::down`]: sync::Semaphore::down
//! [`Lock`]: sync::Lock
//! [`Condvar`]: sync::Condvar
//! [`RwLock`]: sync::RwLock
//! [`Mutex`]: sync::Mutex
//! [`Scheduler`]: thread::scheduler::Scheduler
//! [`InterruptGuard`]: interrupt::InterruptGuard

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs, rustdoc::broken_intra_doc_links)]

extern crate alloc;

pub mod interrupt;
pub mod sync;
pub mod thread;

use num_enum::IntoPrimitive;
use thread::scheduler::Scheduler;

/// Enum representing errors that can occur during a kernel operation.
///
/// Most operations of this crate cannot fail at runtime: a violated
/// precondition is a kernel bug and panics. This enum covers the few
/// recoverable cases.
#[derive(Debug, Eq, PartialEq, IntoPrimitive)]
#[repr(isize)]
pub enum KernelError {
    /// Device or resource busy. (EBUSY)
    Busy = -16,
    /// Invalid arguement. (EINVAL)
    InvalidArgument = -22,
}

impl KernelError {
    /// Converts the [`KernelError`] enum into a corresponding `usize` error
    /// code. The result is cast to `usize` for use as a return value in
    /// system calls.
    pub fn into_usize(self) -> usize {
        isize::from(self) as usize
    }
}

/// The lock could not be acquired at this time because the operation would
/// otherwise block.
#[derive(Debug, Eq, PartialEq)]
pub struct WouldBlock;

/// A builder for system configuration settings.
///
/// The [`SystemConfigurationBuilder`] is used once while the kernel boots to
/// wire this crate to the rest of the kernel.
pub struct SystemConfigurationBuilder {
    _p: (), // Prevents external instantiation while allowing future extensions.
}

impl SystemConfigurationBuilder {
    /// Starts the configuration.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self { _p: () }
    }

    /// Sets the system-wide scheduler.
    ///
    /// The scheduler must outlive every primitive, so it is taken by
    /// `'static` reference. The scheduler can be installed only once; later
    /// calls return [`KernelError::Busy`] and leave the first one in place.
    pub fn set_scheduler(self, scheduler: &'static dyn Scheduler) -> Result<(), KernelError> {
        thread::scheduler::set_scheduler(scheduler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_of_kernel_errors() {
        assert_eq!(KernelError::Busy.into_usize(), -16isize as usize);
        assert_eq!(KernelError::InvalidArgument.into_usize(), -22isize as usize);
    }
}
