mod common;

use common::{Events, prio};
use grading::{ThreadBuilder, interrupt, kernel_test, validate_donations};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use synch::{interrupt::in_interrupt_context, sync::Semaphore};

#[kernel_test]
fn counter_follows_ups_and_downs() {
    let sema = Semaphore::new(2);
    assert!(sema.try_down());
    assert!(sema.try_down());
    assert!(!sema.try_down());
    assert_eq!(sema.value(), 0);

    sema.up();
    sema.up();
    sema.up();
    assert_eq!(sema.value(), 3);
    sema.down();
    assert_eq!(sema.value(), 2);
}

#[validate_donations]
#[kernel_test]
fn ping_pong() {
    let sema = Arc::new([Semaphore::new(0), Semaphore::new(0)]);
    let rounds = Arc::new(AtomicUsize::new(0));

    let s = sema.clone();
    let r = rounds.clone();
    let handle = ThreadBuilder::new("sema-test").spawn(move || {
        for _ in 0..10 {
            s[0].down();
            r.fetch_add(1, Ordering::SeqCst);
            s[1].up();
        }
    });

    for i in 0..10 {
        sema[0].up();
        sema[1].down();
        assert_eq!(rounds.load(Ordering::SeqCst), i + 1);
    }
    handle.join();
    assert_eq!(sema[0].value(), 0);
    assert_eq!(sema[1].value(), 0);
}

#[validate_donations]
#[kernel_test]
fn up_wakes_highest_priority_waiter() {
    let sema = Arc::new(Semaphore::new(0));
    let events = Events::new();

    let handles = [("a", 32), ("b", 35), ("c", 33)].map(|(name, p)| {
        let sema = sema.clone();
        let events = events.clone();
        ThreadBuilder::new(name)
            .priority(prio(p))
            .spawn(move || {
                sema.down();
                events.push(name);
            })
    });
    // Every waiter outranks main, so each ran up to its `down`.
    assert!(events.take().is_empty());

    for _ in 0..3 {
        sema.up();
    }
    assert_eq!(events.take(), ["b", "c", "a"]);
    for handle in handles {
        handle.join();
    }
}

#[validate_donations]
#[kernel_test]
fn interrupt_handler_signals_a_waiter() {
    let sema = Arc::new(Semaphore::new(0));
    let events = Events::new();

    let s = sema.clone();
    let e = events.clone();
    let handle = ThreadBuilder::new("waiter")
        .priority(prio(40))
        .spawn(move || {
            s.down();
            e.push("woken");
        });

    interrupt(|| {
        assert!(in_interrupt_context());
        assert!(!sema.try_down());
        sema.up();
        // The waiter runs only once the handler returns.
        assert!(events.take().is_empty());
    });
    assert!(!in_interrupt_context());
    assert_eq!(events.take(), ["woken"]);
    handle.join();
}

#[kernel_test]
fn try_down_in_interrupt_handler() {
    let sema = Semaphore::new(1);
    interrupt(|| {
        assert!(sema.try_down());
        assert!(!sema.try_down());
    });
    assert_eq!(sema.value(), 0);
}

#[kernel_test]
#[should_panic(expected = "interrupt handler")]
fn down_in_interrupt_handler_panics() {
    let sema = Semaphore::new(1);
    interrupt(|| sema.down());
}

#[kernel_test]
#[should_panic(expected = "deadlock")]
fn down_without_up_is_a_deadlock() {
    let sema = Semaphore::new(0);
    sema.down();
}
