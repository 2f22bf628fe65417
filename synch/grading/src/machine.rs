//! A uniprocessor machine simulated on host threads.
//!
//! Every kernel thread is backed by a host thread, but only the one holding
//! the CPU baton runs; the others sleep on a host condition variable until
//! the scheduler hands the baton to them. Scheduling is strict priority on
//! effective priorities, first-come first-served among equals. The running
//! thread is preempted whenever it re-enables interrupts while a ready
//! thread of strictly higher priority exists.
//!
//! The interrupt level is saved when a thread gives up the CPU and restored
//! when it gets the CPU back. A new thread starts with interrupts enabled.

use std::{
    any::Any,
    cell::RefCell,
    panic::{AssertUnwindSafe, catch_unwind, resume_unwind},
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
};
use synch::{
    SystemConfigurationBuilder,
    interrupt::{InterruptGuard, InterruptState},
    sync::Semaphore,
    thread::{Priority, Thread, ThreadRef, scheduler::Scheduler},
};

struct Cpu {
    running: Option<u64>,
    ready: Vec<ThreadRef>,
    intr: InterruptState,
    in_interrupt: bool,
    halted: bool,
    panic: Option<Box<dyn Any + Send>>,
}

impl Cpu {
    // Highest effective priority first, earliest arrival among equals.
    fn pick_next(&mut self) -> Option<ThreadRef> {
        let mut best: Option<usize> = None;
        for (idx, th) in self.ready.iter().enumerate() {
            if best.is_none_or(|b| th.priority() > self.ready[b].priority()) {
                best = Some(idx);
            }
        }
        best.map(|idx| self.ready.remove(idx))
    }

    fn crash(&mut self, payload: Box<dyn Any + Send>) {
        if self.panic.is_none() {
            self.panic = Some(payload);
        }
        self.halted = true;
    }
}

/// A simulated single-CPU machine.
pub struct Machine {
    cpu: Mutex<Cpu>,
    wakeup: Condvar,
    donation: bool,
    main: ThreadRef,
    threads: Mutex<Vec<ThreadRef>>,
}

thread_local! {
    static CONTEXT: RefCell<Option<(Arc<Machine>, ThreadRef)>> = const { RefCell::new(None) };
}

fn context() -> (Arc<Machine>, ThreadRef) {
    CONTEXT
        .with(|ctx| ctx.borrow().clone())
        .unwrap_or_else(|| panic!("grading: not running on a simulated machine."))
}

pub(crate) fn current_thread() -> Option<ThreadRef> {
    CONTEXT.with(|ctx| ctx.borrow().as_ref().map(|(_, th)| th.clone()))
}

impl Machine {
    /// Starts the configuration of a machine.
    pub fn builder() -> MachineBuilder {
        MachineBuilder {
            main_priority: Priority::DEFAULT,
            priority_donation: true,
        }
    }

    fn lock_cpu(&self) -> MutexGuard<'_, Cpu> {
        self.cpu.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Parks the calling host thread until `tid` holds the CPU.
    fn wait_for_cpu<'a>(&'a self, mut cpu: MutexGuard<'a, Cpu>, tid: u64) -> MutexGuard<'a, Cpu> {
        while cpu.halted || cpu.running != Some(tid) {
            cpu = self
                .wakeup
                .wait(cpu)
                .unwrap_or_else(PoisonError::into_inner);
        }
        cpu
    }

    // Gives the CPU to the best ready thread and waits to be scheduled
    // again. With `requeue`, `me` stays ready; otherwise it is blocked until
    // someone unblocks it.
    fn schedule<'a>(&'a self, mut cpu: MutexGuard<'a, Cpu>, me: &ThreadRef, requeue: bool) {
        if requeue {
            cpu.ready.push(me.clone());
        }
        let Some(next) = cpu.pick_next() else {
            cpu.crash(Box::new(format!(
                "deadlock: {}({}) blocks and no thread is ready to run.",
                me.name, me.tid
            )));
            self.wakeup.notify_all();
            // Never returns: the machine is halted.
            drop(self.wait_for_cpu(cpu, me.tid));
            return;
        };
        if next.tid == me.tid {
            return;
        }

        let saved = cpu.intr;
        log::trace!("switch {}({}) -> {}({})", me.name, me.tid, next.name, next.tid);
        cpu.running = Some(next.tid);
        self.wakeup.notify_all();
        let mut cpu = self.wait_for_cpu(cpu, me.tid);
        cpu.intr = saved;
    }

    fn preempt_if_needed<'a>(&'a self, cpu: MutexGuard<'a, Cpu>, me: &ThreadRef) {
        let outranked = cpu.ready.iter().any(|th| th.priority() > me.priority());
        if outranked && !cpu.in_interrupt && !cpu.halted && !std::thread::panicking() {
            self.schedule(cpu, me, true);
        }
    }

    fn exit(&self, me: &ThreadRef) {
        let mut cpu = self.lock_cpu();
        if Arc::ptr_eq(me, &self.main) {
            cpu.halted = true;
        } else if let Some(next) = cpu.pick_next() {
            cpu.running = Some(next.tid);
        } else if !cpu.halted {
            cpu.crash(Box::new(format!(
                "deadlock: {}({}) exits and no thread is ready to run.",
                me.name, me.tid
            )));
        }
        self.wakeup.notify_all();
    }

    // Runs `f` as `th` on a fresh host thread, once the scheduler picks it.
    fn start<F>(self: &Arc<Self>, th: ThreadRef, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let machine = self.clone();
        let builder = std::thread::Builder::new().name(th.name.clone());
        let result = builder.spawn(move || {
            CONTEXT.with(|ctx| *ctx.borrow_mut() = Some((machine.clone(), th.clone())));
            let mut cpu = machine.wait_for_cpu(machine.lock_cpu(), th.tid);
            cpu.intr = InterruptState::On;
            drop(cpu);

            match catch_unwind(AssertUnwindSafe(f)) {
                Ok(()) => machine.exit(&th),
                Err(payload) => {
                    machine.lock_cpu().crash(payload);
                    machine.wakeup.notify_all();
                }
            }
        });
        if let Err(e) = result {
            panic!("grading: failed to spawn a host thread: {e}");
        }
    }

    /// Checks that no thread of this machine has an outstanding donation or
    /// waits on a lock, and that every thread runs at its base priority.
    fn validate_donations(&self) {
        let threads = self
            .threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for th in threads {
            let donations = th.donations();
            let waiting = th.waiting_on();
            assert!(
                donations.is_empty(),
                "{}({}) still has donation records: {:?}",
                th.name,
                th.tid,
                donations
            );
            assert!(
                waiting.is_none(),
                "{}({}) still waits on {:?}",
                th.name,
                th.tid,
                waiting
            );
            assert_eq!(
                th.priority(),
                th.base_priority(),
                "{}({}) runs above its base priority",
                th.name,
                th.tid
            );
        }
    }
}

/// A builder for a [`Machine`].
pub struct MachineBuilder {
    main_priority: Priority,
    priority_donation: bool,
}

impl MachineBuilder {
    /// Sets the priority of the main thread.
    pub fn main_priority(mut self, priority: Priority) -> Self {
        self.main_priority = priority;
        self
    }

    /// Enables or disables priority donation.
    pub fn priority_donation(mut self, on: bool) -> Self {
        self.priority_donation = on;
        self
    }

    /// Boots a machine and runs `f` as its main thread.
    ///
    /// Returns when `f` returns. Threads still alive at that point are
    /// abandoned. A panic in any thread halts the machine and is resumed on
    /// the caller.
    pub fn run<F>(self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        crate::logger::init();
        install_scheduler();

        let main = Thread::new("main", self.main_priority);
        let machine = Arc::new(Machine {
            cpu: Mutex::new(Cpu {
                running: Some(main.tid),
                ready: Vec::new(),
                intr: InterruptState::On,
                in_interrupt: false,
                halted: false,
                panic: None,
            }),
            wakeup: Condvar::new(),
            donation: self.priority_donation,
            main: main.clone(),
            threads: Mutex::new(vec![main.clone()]),
        });
        machine.start(main, f);

        let mut cpu = machine.lock_cpu();
        while !cpu.halted {
            cpu = machine
                .wakeup
                .wait(cpu)
                .unwrap_or_else(PoisonError::into_inner);
        }
        let panic = cpu.panic.take();
        drop(cpu);
        if let Some(payload) = panic {
            resume_unwind(payload);
        }
    }
}

/// Thread factory, which is used to configure the properties of a new
/// thread.
pub struct ThreadBuilder {
    name: String,
    priority: Priority,
}

impl ThreadBuilder {
    /// Create a new thread builder for thread `name`.
    pub fn new<I>(name: I) -> Self
    where
        String: From<I>,
    {
        Self {
            name: String::from(name),
            priority: Priority::DEFAULT,
        }
    }

    /// Sets the base priority of the new thread.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Spawns a new thread running `f`.
    ///
    /// If the new thread outranks the running one, it runs immediately.
    pub fn spawn<F>(self, f: F) -> JoinHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let (machine, _) = context();
        let th = Thread::new(self.name, self.priority);
        let exited = Arc::new(Semaphore::new(0));
        machine
            .threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(th.clone());

        let done = exited.clone();
        machine.start(th.clone(), move || {
            f();
            done.up();
        });

        let guard = InterruptGuard::new();
        machine.lock_cpu().ready.push(th.clone());
        drop(guard);
        JoinHandle { th, exited }
    }
}

/// An owned permission to join on a thread (block on its termination).
pub struct JoinHandle {
    th: ThreadRef,
    exited: Arc<Semaphore>,
}

impl JoinHandle {
    /// The thread this handle refers to.
    pub fn thread(&self) -> &ThreadRef {
        &self.th
    }

    /// Sleeps until the thread has finished.
    pub fn join(self) {
        self.exited.down();
    }
}

/// Gives up the CPU to a ready thread of the same or higher priority.
pub fn yield_now() {
    let (machine, me) = context();
    let cpu = machine.lock_cpu();
    assert!(!cpu.in_interrupt, "yield_now called from an interrupt handler.");
    machine.schedule(cpu, &me, true);
}

/// Runs `f` as an external interrupt handler of the running thread.
///
/// A thread woken by the handler that outranks the interrupted one runs as
/// soon as the handler returns, if the interrupted thread had interrupts
/// enabled.
pub fn interrupt<R>(f: impl FnOnce() -> R) -> R {
    let (machine, _) = context();
    let prev = {
        let mut cpu = machine.lock_cpu();
        assert!(!cpu.in_interrupt, "nested interrupt handler.");
        cpu.in_interrupt = true;
        std::mem::replace(&mut cpu.intr, InterruptState::Off)
    };
    let result = f();
    machine.lock_cpu().in_interrupt = false;
    SIM.intr_set_level(prev);
    result
}

/// Checks the donation state of every thread of the running machine.
///
/// # Panics
/// Panics if a thread still holds a donation record or a waiting edge, or
/// runs above its base priority.
pub fn validate_donations() {
    let (machine, _) = context();
    machine.validate_donations();
}

/// The scheduler of every simulated machine; each call is routed to the
/// machine of the calling host thread.
struct SimScheduler;

static SIM: SimScheduler = SimScheduler;

fn install_scheduler() {
    static INSTALL: std::sync::Once = std::sync::Once::new();
    INSTALL.call_once(|| {
        if SystemConfigurationBuilder::new().set_scheduler(&SIM).is_err() {
            panic!("grading: another scheduler is installed.");
        }
    });
}

impl Scheduler for SimScheduler {
    fn current(&self) -> ThreadRef {
        context().1
    }

    fn block(&self, _guard: &InterruptGuard) {
        let (machine, me) = context();
        let cpu = machine.lock_cpu();
        assert!(
            cpu.intr == InterruptState::Off,
            "blocking with interrupts enabled."
        );
        machine.schedule(cpu, &me, false);
    }

    fn unblock(&self, th: ThreadRef) {
        let (machine, _) = context();
        let mut cpu = machine.lock_cpu();
        assert!(
            !cpu.ready.iter().any(|t| Arc::ptr_eq(t, &th)),
            "unblocking a ready thread."
        );
        cpu.ready.push(th);
    }

    fn intr_disable(&self) -> InterruptState {
        let (machine, _) = context();
        let mut cpu = machine.lock_cpu();
        std::mem::replace(&mut cpu.intr, InterruptState::Off)
    }

    fn intr_set_level(&self, state: InterruptState) {
        let (machine, me) = context();
        let mut cpu = machine.lock_cpu();
        cpu.intr = state;
        if state == InterruptState::On {
            machine.preempt_if_needed(cpu, &me);
        }
    }

    fn intr_get_level(&self) -> InterruptState {
        let (machine, _) = context();
        machine.lock_cpu().intr
    }

    fn intr_context(&self) -> bool {
        let (machine, _) = context();
        machine.lock_cpu().in_interrupt
    }

    fn priority_donation(&self) -> bool {
        context().0.donation
    }
}
