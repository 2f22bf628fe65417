#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use synch::thread::Priority;

/// What the threads of a test did, in order.
#[derive(Clone, Default)]
pub struct Events(Arc<Mutex<Vec<String>>>);

impl Events {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

pub fn prio(v: u8) -> Priority {
    Priority::new(v)
}
