//! A fixed-capacity free list of reusable [`ErrorRecord`] allocations (`C4`).
//!
//! Pooling trades allocation churn for a small bookkeeping cost: acquiring a
//! record from the pool reuses its heap-backed fields in place rather than
//! allocating fresh ones, and releasing a record marks it invalid (`I3`) so
//! that any lingering reference observes `is_error() == false` afterward.

use std::cell::RefCell;

use crate::brand::{Brand, ErrorRecord};
use crate::events::{emit, EventKind, EventPayload};

/// Default number of retired records kept ready for reuse.
pub const DEFAULT_CAPACITY: usize = 64;

/// Counters describing pool activity. Never affects correctness; purely
/// observational (surfaced for diagnostics and tests).
#[derive(Clone, Copy, Debug, Default)]
pub struct PoolStats {
    pub created: u64,
    pub acquired: u64,
    pub released: u64,
    pub double_release_attempts: u64,
}

/// A bounded free list of retired [`ErrorRecord`]s.
pub struct ErrorPool {
    capacity: usize,
    free: Vec<ErrorRecord>,
    stats: PoolStats,
}

impl ErrorPool {
    pub fn new(capacity: usize) -> Self {
        ErrorPool { capacity, free: Vec::new(), stats: PoolStats::default() }
    }

    /// Takes a retired record off the free list and re-brands it, or
    /// returns `None` if the pool is currently empty.
    pub fn try_acquire(&mut self) -> Option<ErrorRecord> {
        let mut record = self.free.pop()?;
        record.brand = Some(Brand);
        record.pooled_in_use.set(true);
        self.stats.acquired += 1;
        Some(record)
    }

    /// Records that a brand-new (non-pooled) record was created, for stats.
    pub fn record_created(&mut self) {
        self.stats.created += 1;
    }

    /// Returns `record` to the free list for reuse.
    ///
    /// Releasing a record that was never acquired from this pool (or was
    /// already released) is a no-op beyond bumping
    /// [`PoolStats::double_release_attempts`] — pooling never panics on
    /// misuse (`I3`).
    pub fn release(&mut self, mut record: ErrorRecord) {
        if !record.pooled_in_use.get() {
            self.stats.double_release_attempts += 1;
            return;
        }
        record.pooled_in_use.set(false);
        record.brand = None;
        if self.free.len() < self.capacity {
            self.free.push(record);
            self.stats.released += 1;
        }
        emit(EventKind::Released, EventPayload::Released);
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Number of records currently sitting on the free list.
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    pub fn clear(&mut self) {
        self.free.clear();
        self.stats = PoolStats::default();
    }
}

thread_local! {
    static POOL: RefCell<ErrorPool> = RefCell::new(ErrorPool::new(DEFAULT_CAPACITY));
}

/// Attempts to acquire a retired record from this thread's pool.
pub fn try_acquire() -> Option<ErrorRecord> {
    POOL.with(|p| p.borrow_mut().try_acquire())
}

pub fn record_created() {
    POOL.with(|p| p.borrow_mut().record_created());
}

/// Releases `record` back to this thread's pool.
pub fn release(record: ErrorRecord) {
    POOL.with(|p| p.borrow_mut().release(record));
}

pub fn stats() -> PoolStats {
    POOL.with(|p| p.borrow().stats())
}

#[cfg(test)]
pub(crate) fn reset_for_test() {
    POOL.with(|p| p.borrow_mut().clear());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn fresh_record() -> ErrorRecord {
        ErrorRecord::new(Rc::from("TestError"), "boom".into(), crate::lazy::Lazy::ready(Rc::from("test")), 0)
    }

    #[test]
    fn release_emits_error_released() {
        crate::events::reset_for_test();
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        crate::events::events().on(EventKind::Released, move |_| calls_clone.set(calls_clone.get() + 1));
        let mut pool = ErrorPool::new(4);
        let mut record = fresh_record();
        record.pooled_in_use.set(true);
        pool.release(record);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn release_then_acquire_reuses_allocation() {
        let mut pool = ErrorPool::new(4);
        let mut record = fresh_record();
        record.pooled_in_use.set(true);
        pool.release(record);
        assert_eq!(pool.free_len(), 1);

        let acquired = pool.try_acquire().expect("should reuse the released record");
        assert!(acquired.is_valid());
        assert_eq!(pool.stats().acquired, 1);
    }

    #[test]
    fn releasing_unacquired_record_is_detected_and_harmless() {
        let mut pool = ErrorPool::new(4);
        let record = fresh_record(); // pooled_in_use defaults to false
        pool.release(record);
        assert_eq!(pool.free_len(), 0);
        assert_eq!(pool.stats().double_release_attempts, 1);
    }

    #[test]
    fn released_record_is_no_longer_a_valid_error() {
        let mut pool = ErrorPool::new(4);
        let mut record = fresh_record();
        record.pooled_in_use.set(true);
        assert!(record.is_valid());
        pool.release(record);
        // the record was moved into the free list; pull it back out to
        // observe its brand was cleared on release.
        let reclaimed = pool.free.pop().unwrap();
        assert!(!reclaimed.is_valid());
    }
}
