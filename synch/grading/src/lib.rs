//! Test harness for the synchronization layer.
//!
//! Kernel code cannot be tested on the host as is: it needs a scheduler, a
//! CPU whose interrupts can be disabled, and threads that can be put to
//! sleep. This crate provides all three as a simulated uniprocessor
//! [`Machine`], and the `#[kernel_test]` attribute that runs a test body as
//! the main thread of a fresh machine:
//!
//! ```rust,ignore
//! #[kernel_test(10)]
//! fn smoke() {
//!     let lock = Lock::new();
//!     lock.acquire();
//!     lock.release();
//! }
//! ```
//!
//! Log output of the layer is printed to stderr, filtered by the `SYNCH_LOG`
//! environment variable (`off`, `error`, `warn`, `info`, `debug` or
//! `trace`; `warn` by default).
extern crate grading_derive;

mod logger;
mod machine;

pub use grading_derive::*;
pub use machine::{
    JoinHandle, Machine, MachineBuilder, ThreadBuilder, interrupt, validate_donations, yield_now,
};
