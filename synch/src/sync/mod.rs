//! # Synchronization Primitives.
//!
//! A kernel must coordinate access to shared resources among its threads. On
//! one CPU the lowest-level tool is disabling interrupts, which is cheap but
//! only suitable for a handful of instructions. Everything longer needs a
//! primitive that puts the waiting thread to sleep instead.
//!
//! | Primitive     | Blocks Thread? | Order of wakeup     | Typical Use Case                          |
//! |---------------|----------------|---------------------|-------------------------------------------|
//! | [`SpinLock`]  | No (busy wait) | -                   | Bookkeeping with interrupts disabled      |
//! | [`Semaphore`] | Yes            | Highest priority    | Counting resources, signaling events      |
//! | [`Lock`]      | Yes            | Highest priority    | Mutual exclusion, with priority donation  |
//! | [`Condvar`]   | Yes            | Highest priority    | Waiting for a condition under a [`Lock`]  |
//! | [`RwLock`]    | Yes            | Highest priority    | Many readers or one writer                |
//! | [`Mutex`]     | Yes            | Highest priority    | A [`Lock`] together with the data it guards |
//!
//! All sleeping primitives are built on [`Semaphore`]: its
//! [`down`](Semaphore::down) is the only place in this crate where a thread
//! sleeps. Waiters are always woken in order of their *current* effective
//! priority, which donation may have raised while they slept.
//!
//! [`SpinLock`]: spinlock::SpinLock

pub(crate) mod donation;

pub mod condvar;
pub mod lock;
pub mod mutex;
pub mod rwlock;
pub mod semaphore;
pub mod spinlock;
pub mod wait_queue;

pub use condvar::Condvar;
pub use lock::{Lock, LockId};
pub use mutex::{Mutex, MutexGuard};
pub use rwlock::RwLock;
pub use semaphore::Semaphore;
