//! Per-thread donation bookkeeping.
//!
//! Each thread owns a [`DonationState`]:
//!
//! - one *donation record* per held lock through which priority was donated,
//!   mapping the lock to the highest priority that flowed through it;
//! - at most one *waiting edge*, naming the lock the thread is blocked on and
//!   the cell holding that lock's current holder.
//!
//! Records live in the thread's own map, so releasing a lock drops exactly
//! the record that belongs to it. Every function here must be called with
//! interrupts disabled.

use crate::{
    sync::{LockId, spinlock::SpinLock},
    thread::{Priority, Thread, ThreadRef},
};
use alloc::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::Arc,
    vec::Vec,
};

/// The cell holding the current holder of a lock.
pub(crate) type HolderCell = SpinLock<Option<ThreadRef>>;

/// The lock a thread is blocked on.
pub(crate) struct WaitEdge {
    lock: LockId,
    holder: Arc<HolderCell>,
}

/// Donation records and the waiting edge of one thread.
pub(crate) struct DonationState {
    records: BTreeMap<LockId, Priority>,
    waiting: Option<WaitEdge>,
}

impl DonationState {
    pub(crate) const fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            waiting: None,
        }
    }

    /// The highest priority donated through any held lock.
    pub(crate) fn highest_donation(&self) -> Option<Priority> {
        self.records.values().max().copied()
    }

    pub(crate) fn records(&self) -> Vec<(LockId, Priority)> {
        self.records.iter().map(|(l, p)| (*l, *p)).collect()
    }

    pub(crate) fn waiting_on(&self) -> Option<LockId> {
        self.waiting.as_ref().map(|edge| edge.lock)
    }

    // Records are only ever raised; a lower donation through the same lock
    // leaves the record untouched.
    fn raise(&mut self, lock: LockId, priority: Priority) {
        let record = self.records.entry(lock).or_insert(priority);
        if *record < priority {
            *record = priority;
        }
    }
}

/// Records that `waiter` is about to block on `lock`, currently held by the
/// thread in `holder`.
pub(crate) fn begin_wait(waiter: &Thread, lock: LockId, holder: &Arc<HolderCell>) {
    let mut state = waiter.donation.lock();
    let prev = state.waiting.replace(WaitEdge {
        lock,
        holder: holder.clone(),
    });
    state.unlock();
    debug_assert!(prev.is_none(), "thread waits on two locks");
}

/// Drops the waiting edge of `waiter`, which just obtained `lock`.
pub(crate) fn end_wait(waiter: &Thread, lock: LockId) {
    let mut state = waiter.donation.lock();
    let edge = state.waiting.take();
    state.unlock();
    debug_assert!(edge.is_none_or(|edge| edge.lock == lock));
}

/// Donates `donor` to `holder`, which holds `lock`, and on down the
/// wait-for chain starting at `holder`.
///
/// The walk is breadth-first over an explicit worklist of `(thread, lock)`
/// pairs, where `lock` is the lock the priority flows through into `thread`.
/// Each reached thread below `donor` is raised to it, and the record for
/// `lock` on that thread is raised as well, so that releasing `lock` later
/// gives the priority back. The walk continues past threads that already
/// run at `donor` or above, since their own holders may not. A visited set
/// stops the walk on a cyclic wait-for relation.
pub(crate) fn donate(donor: Priority, holder: ThreadRef, lock: LockId) {
    let mut worklist = VecDeque::new();
    let mut visited = BTreeSet::new();
    worklist.push_back((holder, lock));

    while let Some((th, lock)) = worklist.pop_front() {
        if !visited.insert(th.tid) {
            continue;
        }

        let mut state = th.donation.lock();
        if th.base_priority() < donor {
            state.raise(lock, donor);
        }
        let next = state
            .waiting
            .as_ref()
            .map(|edge| (edge.lock, edge.holder.clone()));
        state.unlock();

        if th.priority() < donor {
            log::trace!(
                "donate: {}({}) {} -> {} through {:?}",
                th.name,
                th.tid,
                th.priority(),
                donor,
                lock
            );
            th.set_effective_priority(donor);
        }

        if let Some((next_lock, cell)) = next {
            let guard = cell.lock();
            let next_holder = guard.clone();
            guard.unlock();
            if let Some(next_holder) = next_holder {
                worklist.push_back((next_holder, next_lock));
            }
        }
    }
}

/// Gives back the priority donated to `th` through `lock`, which `th` is
/// releasing.
///
/// The effective priority becomes the highest remaining record, never below
/// the base priority. Threads further down the chain keep what they received
/// until they release their own locks.
pub(crate) fn restore(th: &Thread, lock: LockId) {
    let mut state = th.donation.lock();
    let removed = state.records.remove(&lock);
    let highest = state.highest_donation();
    state.unlock();

    let base = th.base_priority();
    let effective = highest.map_or(base, |donated| donated.max(base));
    if removed.is_some() || effective != th.priority() {
        log::trace!(
            "restore: {}({}) {} -> {} releasing {:?}",
            th.name,
            th.tid,
            th.priority(),
            effective,
            lock
        );
    }
    th.set_effective_priority(effective);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn held_by(th: &ThreadRef) -> (Arc<HolderCell>, LockId) {
        let cell = Arc::new(SpinLock::new(Some(th.clone())));
        let id = LockId::of(&cell);
        (cell, id)
    }

    fn prio(v: u8) -> Priority {
        Priority::new(v)
    }

    #[test]
    fn donation_follows_the_chain() {
        let a = Thread::new("a", prio(1));
        let b = Thread::new("b", prio(2));
        let (_x_cell, x) = held_by(&a);
        let (y_cell, y) = held_by(&b);

        // a holds x and waits on y held by b; c (10) blocks on x.
        begin_wait(&a, y, &y_cell);
        donate(prio(10), a.clone(), x);

        assert_eq!(a.priority(), prio(10));
        assert_eq!(b.priority(), prio(10));
        assert_eq!(a.donations(), [(x, prio(10))]);
        assert_eq!(b.donations(), [(y, prio(10))]);

        // b releases y: b drops back, a keeps its donation through x.
        restore(&b, y);
        end_wait(&a, y);
        assert_eq!(b.priority(), prio(2));
        assert_eq!(a.priority(), prio(10));
        assert_eq!(a.waiting_on(), None);

        restore(&a, x);
        assert_eq!(a.priority(), prio(1));
        assert!(a.donations().is_empty());
        assert!(b.donations().is_empty());
    }

    #[test]
    fn release_order_of_multiple_donations() {
        let l = Thread::new("l", prio(5));
        let (_x_cell, x) = held_by(&l);
        let (_y_cell, y) = held_by(&l);

        donate(prio(20), l.clone(), x);
        donate(prio(30), l.clone(), y);
        // A lower donation never lowers a record.
        donate(prio(25), l.clone(), y);
        assert_eq!(l.priority(), prio(30));

        restore(&l, y);
        assert_eq!(l.priority(), prio(20));
        restore(&l, x);
        assert_eq!(l.priority(), prio(5));
        assert!(l.donations().is_empty());
    }

    #[test]
    fn walk_passes_through_higher_threads() {
        let a = Thread::new("a", prio(1));
        let b = Thread::new("b", prio(50));
        let d = Thread::new("d", prio(1));
        let (_x_cell, x) = held_by(&a);
        let (y_cell, y) = held_by(&b);
        let (z_cell, z) = held_by(&d);

        begin_wait(&a, y, &y_cell);
        begin_wait(&b, z, &z_cell);
        donate(prio(10), a.clone(), x);

        assert_eq!(a.priority(), prio(10));
        assert_eq!(b.priority(), prio(50));
        assert!(b.donations().is_empty());
        assert_eq!(d.priority(), prio(10));
        assert_eq!(d.donations(), [(z, prio(10))]);

        end_wait(&a, y);
        end_wait(&b, z);
        restore(&d, z);
        restore(&a, x);
        assert_eq!(d.priority(), prio(1));
        assert_eq!(a.priority(), prio(1));
    }

    #[test]
    fn cyclic_wait_terminates() {
        let a = Thread::new("a", prio(1));
        let b = Thread::new("b", prio(1));
        let (x_cell, x) = held_by(&a);
        let (y_cell, y) = held_by(&b);

        begin_wait(&a, y, &y_cell);
        begin_wait(&b, x, &x_cell);
        donate(prio(40), a.clone(), x);

        assert_eq!(a.priority(), prio(40));
        assert_eq!(b.priority(), prio(40));

        end_wait(&a, y);
        end_wait(&b, x);
        restore(&a, x);
        restore(&b, y);
        assert_eq!(a.priority(), prio(1));
        assert_eq!(b.priority(), prio(1));
    }

    #[test]
    fn restore_respects_raised_base() {
        let l = Thread::new("l", prio(5));
        let (_x_cell, x) = held_by(&l);
        let (_y_cell, y) = held_by(&l);

        donate(prio(20), l.clone(), x);
        donate(prio(30), l.clone(), y);
        l.set_base_priority(prio(25));
        assert_eq!(l.priority(), prio(30));

        restore(&l, y);
        assert_eq!(l.priority(), prio(25));
        restore(&l, x);
        assert_eq!(l.priority(), prio(25));
    }
}
