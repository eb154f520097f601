//! On-demand materialization of deferred [`crate::ErrorRecord`] fields (`C5`).
//!
//! When a field is expensive to compute (formatting a stack trace, cloning
//! a large context map) and the factory is configured for laziness, the
//! field is stored as a pending thunk instead. The thunk runs at most once,
//! on first read, and the computed value is cached forever after (`I4`).

use std::cell::{OnceCell, RefCell};

use crate::brand::ErrorRecord;

/// A single-shot lazily-evaluated cell.
///
/// Either a pending generator waiting to run, or an already-computed value.
/// `force` runs the generator at most once, regardless of how many times it
/// is called.
pub struct Lazy<T> {
    value: OnceCell<T>,
    generator: RefCell<Option<Box<dyn FnOnce() -> T>>>,
}

impl<T> Lazy<T> {
    /// Wraps an already-known value; `force` is a no-op lookup.
    pub fn ready(value: T) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(value);
        Lazy { value: cell, generator: RefCell::new(None) }
    }

    /// Defers computation until the first [`Lazy::force`] call.
    pub fn pending(generator: impl FnOnce() -> T + 'static) -> Self {
        Lazy { value: OnceCell::new(), generator: RefCell::new(Some(Box::new(generator))) }
    }

    /// Runs the generator if this is the first call, caches the result, and
    /// returns a reference to the value either way.
    pub fn force(&self) -> &T {
        self.value.get_or_init(|| {
            let generator = self
                .generator
                .borrow_mut()
                .take()
                .expect("Lazy::force called after the generator was already consumed");
            generator()
        })
    }

    /// `true` if the value has not yet been computed.
    pub fn is_pending(&self) -> bool {
        self.value.get().is_none()
    }
}

/// Named deferred fields on an [`ErrorRecord`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LazyField {
    Source,
    Stack,
    Context,
}

/// `true` if `field` on `record` has not yet been forced.
///
/// Returns `false` for a field that either isn't present on the record at
/// all or was materialized eagerly at creation time.
pub fn is_lazy(record: &ErrorRecord, field: LazyField) -> bool {
    match field {
        LazyField::Source => record.source.is_pending(),
        LazyField::Stack => record.stack.as_ref().is_some_and(Lazy::is_pending),
        LazyField::Context => record.context.as_ref().is_some_and(Lazy::is_pending),
    }
}

/// Forces `field` on `record` to materialize, if it is present and lazy.
/// Forcing does not touch [`crate::ErrorFlags`] and does not emit any
/// lifecycle event — materialization is a pure read-side effect.
pub fn force_evaluation(record: &ErrorRecord, field: LazyField) {
    match field {
        LazyField::Source => {
            record.source.force();
        }
        LazyField::Stack => {
            if let Some(stack) = record.stack.as_ref() {
                stack.force();
            }
        }
        LazyField::Context => {
            if let Some(context) = record.context.as_ref() {
                context.force();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn generator_runs_exactly_once() {
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let lazy = Lazy::pending(move || {
            calls_clone.set(calls_clone.get() + 1);
            "computed".to_owned()
        });
        assert!(lazy.is_pending());
        assert_eq!(lazy.force(), "computed");
        assert_eq!(lazy.force(), "computed");
        assert_eq!(calls.get(), 1);
        assert!(!lazy.is_pending());
    }

    #[test]
    fn ready_is_never_pending() {
        let lazy = Lazy::ready(42);
        assert!(!lazy.is_pending());
        assert_eq!(*lazy.force(), 42);
    }
}
