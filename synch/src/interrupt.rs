//! Interrupt management.
//!
//! On a single CPU, disabling interrupts is the only way to make a sequence
//! of instructions atomic with respect to other threads: with interrupts off,
//! the timer cannot fire and the running thread cannot be preempted. Every
//! primitive of this crate is built on that.
//!
//! The hardware side (the flag register, `cli`/`sti`) belongs to the
//! scheduler; this module wraps it into the RAII [`InterruptGuard`].
use crate::thread::scheduler::scheduler;
use core::marker::PhantomData;

/// Enumeration representing the interrupt state.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InterruptState {
    /// Interrupts are enabled.
    On,
    /// Interrupts are disabled.
    Off,
}

impl InterruptState {
    /// Reads the current interrupt state from the scheduler.
    pub fn current() -> Self {
        scheduler().intr_get_level()
    }
}

/// An RAII-based guard for managing interrupt disabling.
///
/// When an `InterruptGuard` is created, interrupts are disabled. When it is
/// dropped, the interrupt state is restored to what it was before the guard was
/// created.
///
/// **Important:**
/// - [`InterruptGuard`] instances **must be dropped in reverse order of their
///   creation** to prevent unintended interrupt state changes.
/// - A guard held across [`Scheduler::block`] stays valid: the thread gives
///   up the CPU with interrupts off and, when it resumes, finds them off
///   again. Dropping the guard afterwards restores the level the thread had
///   before it went to sleep.
///
/// This structure is created using [`InterruptGuard::new`].
///
/// [`Scheduler::block`]: crate::thread::scheduler::Scheduler::block
pub struct InterruptGuard {
    prev: InterruptState,
    _not_send: PhantomData<*const ()>,
}

impl InterruptGuard {
    /// Creates a new `InterruptGuard`, disabling interrupts.
    ///
    /// # Example
    /// ```rust,ignore
    /// let _guard = InterruptGuard::new(); // Disables interrupts
    /// // Critical section...
    /// // Interrupts are restored when `_guard` goes out of scope.
    /// ```
    pub fn new() -> Self {
        Self {
            prev: scheduler().intr_disable(),
            _not_send: PhantomData,
        }
    }

    /// The interrupt state that will be restored when this guard is dropped.
    pub fn prev(&self) -> InterruptState {
        self.prev
    }
}

impl Default for InterruptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        scheduler().intr_set_level(self.prev);
    }
}

/// Returns true while the CPU is running an external interrupt handler.
///
/// Interrupt handlers must never sleep, so blocking operations assert this
/// is false.
pub fn in_interrupt_context() -> bool {
    scheduler().intr_context()
}
