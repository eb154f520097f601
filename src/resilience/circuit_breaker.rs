//! The circuit breaker state machine (`C14`).

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::brand::ErrorRecord;
use crate::context::{context, ErrorContextExt};
use crate::factory::{create_error, CreateErrorOptions};
use crate::taxonomy::tag;

/// The breaker's current state (`§4.14`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests pass through normally.
    Closed,
    /// Requests fail fast with `CircuitBreakerOpen` without invoking the
    /// protected operation.
    Open,
    /// One trial request is admitted; its outcome decides whether the
    /// breaker returns to `Closed` or back to `Open`.
    HalfOpen,
}

/// A hook deciding whether a given failure counts toward tripping the
/// breaker. Defaults to "every failure counts".
pub type ShouldTripFn = Rc<dyn Fn(&ErrorRecord) -> bool>;

/// Configuration for [`CircuitBreaker::new`].
#[derive(Clone)]
pub struct CircuitBreakerOptions {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub should_trip: Option<ShouldTripFn>,
}

impl Default for CircuitBreakerOptions {
    fn default() -> Self {
        CircuitBreakerOptions {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            should_trip: None,
        }
    }
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    options: CircuitBreakerOptions,
}

/// A `CLOSED -> OPEN -> HALF_OPEN` breaker guarding a protected operation
/// (`§4.14`). Cheaply `Clone`-able: clones share the same underlying state,
/// the way a handle into a process-wide registry would.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Rc<RefCell<Inner>>,
}

impl CircuitBreaker {
    pub fn new(options: CircuitBreakerOptions) -> Self {
        CircuitBreaker {
            inner: Rc::new(RefCell::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                options,
            })),
        }
    }

    /// The breaker's current state. `Open` may lazily transition to
    /// `HalfOpen` as a side effect of reading it, once `reset_timeout` has
    /// elapsed — mirroring [`Self::admit`]'s own transition so callers
    /// inspecting state and callers calling through see the same value.
    pub fn state(&self) -> CircuitState {
        self.maybe_half_open();
        self.inner.borrow().state
    }

    fn maybe_half_open(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.state == CircuitState::Open {
            let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or(Duration::ZERO);
            if elapsed >= inner.options.reset_timeout {
                inner.state = CircuitState::HalfOpen;
            }
        }
    }

    /// Returns `Ok(())` if a call may proceed, or the `CircuitBreakerOpen`
    /// error to fail fast with otherwise (`P12`).
    fn admit(&self) -> Result<(), ErrorRecord> {
        self.maybe_half_open();
        let state = self.inner.borrow().state;
        match state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => Err(create_error(
                CreateErrorOptions::new("circuit breaker is open")
                    .error_type(tag::CIRCUIT_BREAKER_OPEN)
                    .context(context().with("state", "open")),
            )),
        }
    }

    fn should_trip(&self, error: &ErrorRecord) -> bool {
        match &self.inner.borrow().options.should_trip {
            Some(predicate) => predicate(error),
            None => true,
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.consecutive_failures = 0;
        inner.state = CircuitState::Closed;
        inner.opened_at = None;
    }

    fn record_failure(&self, error: &ErrorRecord) {
        if !self.should_trip(error) {
            return;
        }
        let mut inner = self.inner.borrow_mut();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            _ => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= inner.options.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
        }
    }

    /// Runs `f` if the breaker admits the call, recording the outcome.
    pub fn call<T>(&self, f: impl FnOnce() -> Result<T, ErrorRecord>) -> Result<T, ErrorRecord> {
        self.admit()?;
        match f() {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                self.record_failure(&error);
                Err(error)
            }
        }
    }

    /// The async counterpart of [`Self::call`].
    #[cfg(feature = "async-tokio")]
    pub async fn call_async<T, F, Fut>(&self, f: F) -> Result<T, ErrorRecord>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, ErrorRecord>>,
    {
        self.admit()?;
        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                self.record_failure(&error);
                Err(error)
            }
        }
    }
}

/// Builds a breaker from `options` (`§6`: `createCircuitBreaker`).
pub fn create_circuit_breaker(options: CircuitBreakerOptions) -> CircuitBreaker {
    CircuitBreaker::new(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset() {
        crate::config::reset_for_test();
        crate::pool::reset_for_test();
        crate::intern::reset_for_test();
    }

    #[test]
    fn trips_open_after_threshold_consecutive_failures() {
        reset();
        let breaker = create_circuit_breaker(CircuitBreakerOptions {
            failure_threshold: 2,
            reset_timeout: Duration::from_secs(60),
            should_trip: None,
        });
        let fail = || -> Result<(), ErrorRecord> {
            Err(create_error(CreateErrorOptions::new("boom").error_type("ExternalError")))
        };
        assert!(breaker.call(fail).is_err());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.call(fail).is_err());
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn open_breaker_fails_fast_without_invoking_operation() {
        reset();
        let breaker = create_circuit_breaker(CircuitBreakerOptions {
            failure_threshold: 1,
            reset_timeout: Duration::from_secs(60),
            should_trip: None,
        });
        let _ = breaker.call(|| -> Result<(), ErrorRecord> {
            Err(create_error(CreateErrorOptions::new("boom")))
        });
        assert_eq!(breaker.state(), CircuitState::Open);

        let invoked = std::cell::Cell::new(false);
        let result = breaker.call(|| {
            invoked.set(true);
            Ok::<_, ErrorRecord>(())
        });
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().error_type(), tag::CIRCUIT_BREAKER_OPEN);
        assert!(!invoked.get());
    }

    #[test]
    fn success_resets_consecutive_failures() {
        reset();
        let breaker = create_circuit_breaker(CircuitBreakerOptions {
            failure_threshold: 2,
            reset_timeout: Duration::from_secs(60),
            should_trip: None,
        });
        let _ = breaker.call(|| -> Result<(), ErrorRecord> {
            Err(create_error(CreateErrorOptions::new("boom")))
        });
        let _ = breaker.call(|| Ok::<_, ErrorRecord>(()));
        let _ = breaker.call(|| -> Result<(), ErrorRecord> {
            Err(create_error(CreateErrorOptions::new("boom")))
        });
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
