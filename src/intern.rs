//! A bounded string intern table (`C3`).
//!
//! `type`/`source` strings repeat constantly across an application's error
//! traffic ("ValidationError", "NotFoundError", module paths, ...).
//! Interning lets [`crate::factory::create_error`] hand out an `Rc<str>`
//! shared across every record with the same tag, enabling pointer-equality
//! comparisons instead of byte-for-byte ones, at the cost of a small,
//! FIFO-bounded table kept per thread.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

/// Default maximum number of distinct strings kept interned at once.
pub const DEFAULT_CAPACITY: usize = 512;

/// A bounded set of interned strings with FIFO eviction.
pub struct InternTable {
    capacity: usize,
    entries: HashMap<Rc<str>, ()>,
    order: VecDeque<Rc<str>>,
}

/// Common strings seeded into every fresh [`InternTable`] at construction
/// (`SPEC_FULL §2`, C3: "pre-intern a fixed list of common strings at
/// startup") — the default `type` tag, every preset name, and every `§7`
/// taxonomy tag a record's `error_type` is likely to carry.
fn seed_strings() -> impl Iterator<Item = &'static str> {
    std::iter::once("Error").chain(crate::config::PRESET_NAMES.iter().copied()).chain([
        crate::taxonomy::tag::VALIDATION_ERROR,
        crate::taxonomy::tag::ENTITY_ERROR,
        crate::taxonomy::tag::AMOUNT_ERROR,
        crate::taxonomy::tag::EXTERNAL_ERROR,
        crate::taxonomy::tag::NETWORK_ERROR,
        crate::taxonomy::tag::TIMEOUT_ERROR,
        crate::taxonomy::tag::ABORTED,
        crate::taxonomy::tag::CIRCUIT_BREAKER_OPEN,
        crate::taxonomy::tag::RATE_LIMITED,
        crate::taxonomy::tag::MAX_RETRIES_EXCEEDED,
        crate::taxonomy::tag::MULTIPLE_ERRORS,
        crate::taxonomy::tag::TYPE_ERROR,
        crate::taxonomy::tag::REFERENCE_ERROR,
        crate::taxonomy::tag::SYNTAX_ERROR,
        crate::taxonomy::tag::RANGE_ERROR,
        crate::taxonomy::tag::URI_ERROR,
        crate::taxonomy::tag::EVAL_ERROR,
        crate::taxonomy::tag::STD_ERROR,
        crate::taxonomy::tag::STRING_ERROR,
        crate::taxonomy::tag::UNKNOWN_ERROR,
        crate::taxonomy::tag::CONFIGURATION_ERROR,
        crate::taxonomy::tag::UNKNOWN_PRESET,
        crate::taxonomy::tag::SERIALIZATION_ERROR,
    ])
}

impl InternTable {
    pub fn new(capacity: usize) -> Self {
        let mut table = InternTable { capacity, entries: HashMap::new(), order: VecDeque::new() };
        for value in seed_strings() {
            table.intern(value);
        }
        table
    }

    /// Returns the shared `Rc<str>` for `value`, interning it first if it
    /// isn't already present. Evicts the oldest entry if the table is full
    /// and `value` is new.
    pub fn intern(&mut self, value: &str) -> Rc<str> {
        if let Some((existing, _)) = self.entries.get_key_value(value) {
            return existing.clone();
        }
        let rc: Rc<str> = Rc::from(value);
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(rc.clone(), ());
        self.order.push_back(rc.clone());
        rc
    }

    /// Number of distinct strings currently interned.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

thread_local! {
    static TABLE: RefCell<InternTable> = RefCell::new(InternTable::new(DEFAULT_CAPACITY));
}

/// Interns `value` in this thread's table, returning a shared `Rc<str>`.
pub fn intern(value: &str) -> Rc<str> {
    TABLE.with(|t| t.borrow_mut().intern(value))
}

/// Number of distinct strings currently interned on this thread.
pub fn len() -> usize {
    TABLE.with(|t| t.borrow().len())
}

/// Resets this thread's intern table back to its freshly-seeded state.
/// Intended for test isolation.
pub fn reset_for_test() {
    TABLE.with(|t| *t.borrow_mut() = InternTable::new(DEFAULT_CAPACITY));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_strings_are_preinterned_at_construction() {
        let table = InternTable::new(DEFAULT_CAPACITY);
        assert!(!table.is_empty());
        assert!(table.entries.contains_key("Error"));
        assert!(table.entries.contains_key(crate::taxonomy::tag::VALIDATION_ERROR));
        assert!(table.entries.contains_key("development"));
    }

    #[test]
    fn repeated_values_share_allocation() {
        let mut table = InternTable::new(8);
        let a = table.intern("ValidationError");
        let b = table.intern("ValidationError");
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn fifo_eviction_at_capacity() {
        let mut table = InternTable::new(2);
        let first = table.intern("a");
        table.intern("b");
        table.intern("c"); // evicts "a"
        assert_eq!(table.len(), 2);
        let first_again = table.intern("a");
        assert!(!Rc::ptr_eq(&first, &first_again));
    }
}
