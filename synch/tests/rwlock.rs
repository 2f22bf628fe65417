mod common;

use common::{Events, prio};
use grading::{ThreadBuilder, kernel_test, validate_donations};
use std::sync::Arc;
use synch::{
    sync::{RwLock, Semaphore},
    thread::{self, Priority},
};

#[validate_donations]
#[kernel_test]
fn readers_do_not_block_each_other() {
    let rw = Arc::new(RwLock::new());
    let events = Events::new();
    rw.read_acquire();

    let handles = (0..3)
        .map(|i| {
            let (rw, events) = (rw.clone(), events.clone());
            ThreadBuilder::new(format!("reader{i}"))
                .priority(prio(32))
                .spawn(move || {
                    rw.read_acquire();
                    events.push(format!("reader{i} in with {}", rw.readers()));
                    rw.read_release();
                })
        })
        .collect::<Vec<_>>();

    // Each reader went through while main was still reading.
    assert_eq!(
        events.take(),
        ["reader0 in with 2", "reader1 in with 2", "reader2 in with 2"]
    );
    assert_eq!(rw.readers(), 1);
    rw.read_release();
    assert_eq!(rw.readers(), 0);
    for handle in handles {
        handle.join();
    }
}

#[validate_donations]
#[kernel_test]
fn writer_waits_for_the_last_reader() {
    let rw = Arc::new(RwLock::new());
    let events = Events::new();
    rw.read_acquire();

    let (w, e) = (rw.clone(), events.clone());
    let writer = ThreadBuilder::new("writer")
        .priority(prio(40))
        .spawn(move || {
            w.write_acquire();
            e.push(format!("writer in with {} readers", w.readers()));
            w.write_release();
        });
    assert!(events.take().is_empty());
    // The readers hold the write gate, so the writer donates to them.
    assert_eq!(thread::get_priority(), prio(40));

    rw.read_release();
    assert_eq!(events.take(), ["writer in with 0 readers"]);
    assert_eq!(thread::get_priority(), Priority::DEFAULT);
    writer.join();
}

#[validate_donations]
#[kernel_test]
fn last_reader_out_need_not_be_the_first() {
    let rw = Arc::new(RwLock::new());
    let go = Arc::new(Semaphore::new(0));
    let events = Events::new();
    rw.read_acquire();

    let (r, g, e) = (rw.clone(), go.clone(), events.clone());
    let reader = ThreadBuilder::new("reader")
        .priority(prio(32))
        .spawn(move || {
            r.read_acquire();
            g.down();
            r.read_release();
            e.push("reader out");
        });
    rw.read_release();
    assert_eq!(rw.readers(), 1);

    let (w, e) = (rw.clone(), events.clone());
    let writer = ThreadBuilder::new("writer")
        .priority(prio(40))
        .spawn(move || {
            w.write_acquire();
            e.push("writer");
            w.write_release();
        });
    assert!(events.take().is_empty());
    // The writer donates to the reader still inside, not to main.
    assert_eq!(reader.thread().priority(), prio(40));
    assert_eq!(thread::get_priority(), Priority::DEFAULT);

    go.up();
    reader.join();
    writer.join();
    assert_eq!(events.take(), ["writer", "reader out"]);
    assert_eq!(rw.readers(), 0);
}

// A donation received through the readers' write gate follows the gate when
// its holder leaves first.
#[validate_donations]
#[kernel_test]
fn donation_moves_to_the_remaining_reader() {
    let rw = Arc::new(RwLock::new());
    let go = Arc::new(Semaphore::new(0));
    let events = Events::new();
    rw.read_acquire();

    let (r, g, e) = (rw.clone(), go.clone(), events.clone());
    let reader = ThreadBuilder::new("reader")
        .priority(prio(32))
        .spawn(move || {
            r.read_acquire();
            g.down();
            r.read_release();
            e.push("reader out");
        });

    let (w, e) = (rw.clone(), events.clone());
    let writer = ThreadBuilder::new("writer")
        .priority(prio(50))
        .spawn(move || {
            w.write_acquire();
            e.push(format!("writer in with {} readers", w.readers()));
            w.write_release();
        });
    assert_eq!(thread::get_priority(), prio(50));
    assert_eq!(thread::current().donations().len(), 1);
    assert_eq!(reader.thread().priority(), prio(32));

    rw.read_release();
    assert_eq!(thread::get_priority(), Priority::DEFAULT);
    assert!(thread::current().donations().is_empty());
    assert_eq!(reader.thread().priority(), prio(50));
    assert_eq!(reader.thread().donations().len(), 1);
    assert!(events.take().is_empty());

    go.up();
    assert_eq!(events.take(), ["writer in with 0 readers", "reader out"]);
    assert_eq!(reader.thread().priority(), prio(32));
    reader.join();
    writer.join();
}

// r1 reads, leaves while r2 is still inside, and then wants to write.
#[validate_donations]
#[kernel_test]
fn former_reader_writes_after_the_rest_leave() {
    let rw = Arc::new(RwLock::new());
    let go1 = Arc::new(Semaphore::new(0));
    let go2 = Arc::new(Semaphore::new(0));
    let events = Events::new();

    let (r, g, e) = (rw.clone(), go1.clone(), events.clone());
    let r1 = ThreadBuilder::new("r1").priority(prio(33)).spawn(move || {
        r.read_acquire();
        g.down();
        r.read_release();
        e.push("r1 wants to write");
        r.write_acquire();
        e.push(format!("r1 writes with {} readers", r.readers()));
        r.write_release();
    });
    let (r, g, e) = (rw.clone(), go2.clone(), events.clone());
    let r2 = ThreadBuilder::new("r2").priority(prio(32)).spawn(move || {
        r.read_acquire();
        g.down();
        r.read_release();
        e.push("r2 out");
    });
    assert_eq!(rw.readers(), 2);

    go1.up();
    assert_eq!(events.take(), ["r1 wants to write"]);
    assert_eq!(rw.readers(), 1);
    assert!(r1.thread().waiting_on().is_some());
    assert_eq!(r2.thread().priority(), prio(33));

    go2.up();
    assert_eq!(events.take(), ["r1 writes with 0 readers", "r2 out"]);
    assert_eq!(r2.thread().priority(), prio(32));
    r1.join();
    r2.join();
}

// Leaving a read section twice entered by the same thread keeps the gate.
#[validate_donations]
#[kernel_test]
fn nested_read_sections() {
    let rw = Arc::new(RwLock::new());
    let events = Events::new();
    rw.read_acquire();
    rw.read_acquire();
    assert_eq!(rw.readers(), 2);

    let (w, e) = (rw.clone(), events.clone());
    let writer = ThreadBuilder::new("writer")
        .priority(prio(40))
        .spawn(move || {
            w.write_acquire();
            e.push("writer");
            w.write_release();
        });
    rw.read_release();
    assert!(events.take().is_empty());
    assert_eq!(thread::get_priority(), prio(40));

    rw.read_release();
    assert_eq!(events.take(), ["writer"]);
    assert_eq!(thread::get_priority(), Priority::DEFAULT);
    writer.join();
}

#[validate_donations]
#[kernel_test]
fn writer_excludes_readers() {
    let rw = Arc::new(RwLock::new());
    let events = Events::new();
    rw.write_acquire();

    let (r, e) = (rw.clone(), events.clone());
    let reader = ThreadBuilder::new("reader")
        .priority(prio(32))
        .spawn(move || {
            r.read_acquire();
            e.push("reader");
            r.read_release();
        });
    assert!(events.take().is_empty());
    assert_eq!(rw.readers(), 0);

    rw.write_release();
    assert_eq!(events.take(), ["reader"]);
    reader.join();
}

#[kernel_test]
#[should_panic(expected = "without a reader")]
fn read_release_without_reader_panics() {
    let rw = RwLock::new();
    rw.read_release();
}
