//! The lifecycle event bus (`C13`): `errorCreated`, `errorPooled`,
//! `errorReleased`, `errorTransformed`, `errorWrapped`, `errorRetry`,
//! `errorRecovered`, `errorSerialized`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use crate::ErrorRecord;

/// The fixed set of lifecycle event kinds (`§3.1`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Created,
    Pooled,
    Released,
    Transformed,
    Wrapped,
    Retry,
    Recovered,
    Serialized,
}

/// The payload delivered to a listener for a given [`EventKind`].
#[derive(Clone)]
pub enum EventPayload<'a> {
    Created { record: &'a ErrorRecord },
    Pooled { record: &'a ErrorRecord },
    Released,
    Transformed { record: &'a ErrorRecord, middleware: &'static str },
    Wrapped { record: &'a ErrorRecord },
    Retry { attempt: u32, error: &'a ErrorRecord },
    Recovered { attempt: u32 },
    Serialized { record: &'a ErrorRecord },
}

type Listener = Rc<dyn Fn(&EventPayload<'_>)>;

/// An RAII-ish handle returned from [`EventBus::on`]. Call [`Disposer::dispose`]
/// to deregister; dropping it without disposing leaves the listener active
/// (the spec only requires an *explicit* disposer).
pub struct Disposer {
    kind: EventKind,
    id: u64,
}

impl Disposer {
    /// Removes the associated listener from the bus. Idempotent: disposing
    /// twice is harmless.
    pub fn dispose(self) {
        EVENTS.with(|bus| bus.borrow_mut().remove(self.kind, self.id));
    }
}

struct Entry {
    id: u64,
    listener: Listener,
}

#[derive(Default)]
struct EventBusState {
    next_id: u64,
    listeners: HashMap<EventKind, Vec<Entry>>,
}

impl EventBusState {
    fn remove(&mut self, kind: EventKind, id: u64) {
        if let Some(entries) = self.listeners.get_mut(&kind) {
            entries.retain(|entry| entry.id != id);
        }
    }
}

thread_local! {
    static EVENTS: RefCell<EventBusState> = RefCell::new(EventBusState::default());
}

/// A handle for subscribing to lifecycle events.
pub struct EventBus;

impl EventBus {
    /// Registers `listener` for `kind`, run in registration order on every
    /// emission. Returns a [`Disposer`] for explicit deregistration.
    pub fn on(&self, kind: EventKind, listener: impl Fn(&EventPayload<'_>) + 'static) -> Disposer {
        EVENTS.with(|bus| {
            let mut bus = bus.borrow_mut();
            let id = bus.next_id;
            bus.next_id += 1;
            bus.listeners.entry(kind).or_default().push(Entry { id, listener: Rc::new(listener) });
            Disposer { kind, id }
        })
    }
}

/// The process-wide (thread-local) event bus handle.
pub fn events() -> EventBus {
    EventBus
}

/// Runs every listener registered for `payload`'s kind, in registration
/// order. A listener that panics is isolated: the panic is caught, a
/// diagnostic is logged, and emission continues with the remaining
/// listeners (`§4.13`).
pub fn emit(kind: EventKind, payload: EventPayload<'_>) {
    let listeners: Vec<Listener> = EVENTS.with(|bus| {
        bus.borrow()
            .listeners
            .get(&kind)
            .map(|entries| entries.iter().map(|e| e.listener.clone()).collect())
            .unwrap_or_default()
    });
    for listener in listeners {
        let result = catch_unwind(AssertUnwindSafe(|| listener(&payload)));
        if result.is_err() {
            #[cfg(feature = "tracing")]
            tracing::warn!("error event listener panicked; isolated and continuing");
        }
    }
}

#[cfg(test)]
pub(crate) fn reset_for_test() {
    EVENTS.with(|bus| *bus.borrow_mut() = EventBusState::default());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn listeners_run_in_registration_order() {
        reset_for_test();
        let order = Rc::new(RefCell::new(Vec::new()));
        let (o1, o2) = (order.clone(), order.clone());
        events().on(EventKind::Released, move |_| o1.borrow_mut().push(1));
        events().on(EventKind::Released, move |_| o2.borrow_mut().push(2));
        emit(EventKind::Released, EventPayload::Released);
        assert_eq!(*order.borrow(), vec![1, 2]);
    }

    #[test]
    fn disposed_listener_stops_receiving_events() {
        reset_for_test();
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let disposer = events().on(EventKind::Released, move |_| calls_clone.set(calls_clone.get() + 1));
        emit(EventKind::Released, EventPayload::Released);
        disposer.dispose();
        emit(EventKind::Released, EventPayload::Released);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn panicking_listener_is_isolated() {
        reset_for_test();
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        events().on(EventKind::Released, |_| panic!("boom"));
        events().on(EventKind::Released, move |_| calls_clone.set(calls_clone.get() + 1));
        emit(EventKind::Released, EventPayload::Released);
        assert_eq!(calls.get(), 1);
    }
}
