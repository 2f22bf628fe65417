//! Thread scheduler interface.

use super::ThreadRef;
use crate::{
    KernelError,
    interrupt::{InterruptGuard, InterruptState},
};

/// A trait for a thread scheduler.
///
/// The [`Scheduler`] is the part of the kernel this crate depends on. It
/// decides which thread runs, performs the context switches, and owns the
/// interrupt flag of the CPU. The synchronization primitives only ever ask it
/// to:
///
/// - name the running thread ([`current`]),
/// - put the running thread to sleep ([`block`]) and wake a sleeping one
///   ([`unblock`]),
/// - disable interrupts, restore and read their level ([`intr_disable`],
///   [`intr_set_level`], [`intr_get_level`]),
/// - tell whether an interrupt handler is running ([`intr_context`]).
///
/// Thread priorities are kept on the [`Thread`] itself, so the scheduler sees
/// donated priorities as soon as they are set.
///
/// [`current`]: Scheduler::current
/// [`block`]: Scheduler::block
/// [`unblock`]: Scheduler::unblock
/// [`intr_disable`]: Scheduler::intr_disable
/// [`intr_set_level`]: Scheduler::intr_set_level
/// [`intr_get_level`]: Scheduler::intr_get_level
/// [`intr_context`]: Scheduler::intr_context
/// [`Thread`]: super::Thread
pub trait Scheduler: Sync {
    /// Returns the running thread.
    ///
    /// Inside an interrupt handler this is the interrupted thread.
    fn current(&self) -> ThreadRef;

    /// Suspends the running thread until some other thread calls
    /// [`Scheduler::unblock`] on it.
    ///
    /// The caller holds `guard`, i.e. interrupts are disabled, and has already
    /// recorded the thread in some wait queue. When this returns the thread
    /// is running again, still with interrupts disabled.
    fn block(&self, guard: &InterruptGuard);

    /// Makes a blocked thread `th` ready to run.
    ///
    /// This does not preempt the running thread by itself; it may be called
    /// with interrupts disabled and from interrupt handlers.
    fn unblock(&self, th: ThreadRef);

    /// Disables interrupts and returns the previous interrupt state.
    fn intr_disable(&self) -> InterruptState;

    /// Sets the interrupt state to `state`.
    ///
    /// Enabling interrupts is where a preemptive scheduler switches to a
    /// ready thread of higher priority than the running one.
    fn intr_set_level(&self, state: InterruptState);

    /// Returns the current interrupt state.
    ///
    /// The default disables interrupts and restores the previous level, so
    /// it may preempt the running thread when that level is on. Schedulers
    /// that can read the flag directly should override it.
    fn intr_get_level(&self) -> InterruptState {
        let state = self.intr_disable();
        self.intr_set_level(state);
        state
    }

    /// Returns true while an external interrupt handler is running.
    fn intr_context(&self) -> bool;

    /// Whether blocking on a held lock donates priority to its holder.
    ///
    /// Schedulers that compute priorities on their own (e.g. a multi-level
    /// feedback queue) turn this off.
    fn priority_donation(&self) -> bool {
        true
    }
}

static SCHEDULER: spin::Once<&'static dyn Scheduler> = spin::Once::new();

/// Set the scheduler of the kernel.
pub(crate) fn set_scheduler(sched: &'static dyn Scheduler) -> Result<(), KernelError> {
    let mut installed = false;
    SCHEDULER.call_once(|| {
        installed = true;
        sched
    });
    if installed {
        log::debug!("synch: scheduler installed");
        Ok(())
    } else {
        Err(KernelError::Busy)
    }
}

/// Get the reference of the kernel scheduler.
///
/// # Panics
/// Panics if no scheduler has been installed with
/// [`SystemConfigurationBuilder::set_scheduler`].
///
/// [`SystemConfigurationBuilder::set_scheduler`]: crate::SystemConfigurationBuilder::set_scheduler
#[track_caller]
pub fn scheduler() -> &'static dyn Scheduler {
    match SCHEDULER.get() {
        Some(sched) => *sched,
        None => panic!("synch: no scheduler is installed."),
    }
}
