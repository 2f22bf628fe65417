//! RwLock implementations.
//!
//! The kernel's [`RwLock`] is composed from two [`Lock`]s:
//!
//! - the *write gate*, held by a writer, or by the readers as a group;
//! - the *read gate*, protecting the reader count.
//!
//! The first reader to arrive takes the write gate on behalf of all readers,
//! and the last one to leave gives it back, so readers never block each
//! other, and a writer is shut out from the moment the first reader arrives
//! until the last reader leaves.
//!
//! The write gate is always held by a reader that is still inside. When its
//! holder leaves before the others, the gate is handed over to one of them,
//! so a waiting writer donates its priority to a thread that can actually
//! let it in.
//!
//! There is no protection against writer starvation: as long as new readers
//! keep arriving before the last one leaves, a writer waits.

use super::{Lock, spinlock::SpinLock};
use crate::{
    interrupt::InterruptGuard,
    thread::{ThreadRef, current},
};
use alloc::{sync::Arc, vec::Vec};

/// A reader-writer lock
///
/// This type of lock allows a number of readers or at most one writer at any
/// point in time. It protects no data by itself: callers bracket their reads
/// with [`read_acquire`]/[`read_release`] and their writes with
/// [`write_acquire`]/[`write_release`].
///
/// [`read_acquire`]: Self::read_acquire
/// [`read_release`]: Self::read_release
/// [`write_acquire`]: Self::write_acquire
/// [`write_release`]: Self::write_release
pub struct RwLock {
    // Threads in a read section, once per entry. Only changed with
    // `read_gate` held.
    readers: SpinLock<Vec<ThreadRef>>,
    read_gate: Lock,
    write_gate: Lock,
}

enum Departure {
    NotAReader,
    StillReading,
    Last,
    HandOver(ThreadRef),
}

impl RwLock {
    /// Creates a new reader-writer lock with no readers and no writer.
    pub fn new() -> Self {
        Self {
            readers: SpinLock::new(Vec::new()),
            read_gate: Lock::new(),
            write_gate: Lock::new(),
        }
    }

    fn with_readers<R>(&self, f: impl FnOnce(&mut Vec<ThreadRef>) -> R) -> R {
        let guard = InterruptGuard::new();
        let mut readers = self.readers.lock();
        let result = f(&mut readers);
        readers.unlock();
        drop(guard);
        result
    }

    /// Enters a read section, sleeping while a writer holds the lock.
    #[track_caller]
    pub fn read_acquire(&self) {
        self.read_gate.acquire();
        if self.readers() == 0 {
            self.write_gate.acquire();
        }
        let me = current();
        self.with_readers(|readers| readers.push(me));
        self.read_gate.release();
    }

    /// Leaves a read section. The last reader out lets writers in.
    ///
    /// # Panics
    /// Panics if the running thread is not in a read section.
    #[track_caller]
    pub fn read_release(&self) {
        self.read_gate.acquire();
        let me = current();
        let departure = self.with_readers(|readers| {
            let Some(pos) = readers.iter().position(|th| Arc::ptr_eq(th, &me)) else {
                return Departure::NotAReader;
            };
            readers.remove(pos);
            if readers.iter().any(|th| Arc::ptr_eq(th, &me)) {
                Departure::StillReading
            } else {
                match readers.first() {
                    Some(next) => Departure::HandOver(next.clone()),
                    None => Departure::Last,
                }
            }
        });

        match departure {
            Departure::NotAReader => {
                self.read_gate.release();
                panic!("RwLock::read_release without a reader.");
            }
            Departure::StillReading => (),
            Departure::Last => self.write_gate.release(),
            Departure::HandOver(next) => {
                if self.write_gate.held_by_current() {
                    self.write_gate.hand_over(next);
                }
            }
        }
        self.read_gate.release();
    }

    /// Enters the write section, sleeping while readers or another writer
    /// are inside.
    #[track_caller]
    pub fn write_acquire(&self) {
        self.write_gate.acquire();
    }

    /// Leaves the write section.
    ///
    /// # Panics
    /// Panics if the running thread is not the writer.
    #[track_caller]
    pub fn write_release(&self) {
        self.write_gate.release();
    }

    /// Number of read sections currently entered.
    pub fn readers(&self) -> usize {
        self.with_readers(|readers| readers.len())
    }
}

impl Default for RwLock {
    fn default() -> Self {
        Self::new()
    }
}
