//! Retry, rate-limiting, and circuit-breaker resilience primitives (`C14`).
//!
//! Each primitive is a small state machine owned behind an `Rc<RefCell<_>>`
//! handle, following the same single-threaded-shared-state pattern as
//! [`crate::config`]'s cache and [`crate::pool`]'s free list — no atomics or
//! locks, since the whole crate commits to a single-threaded cooperative
//! concurrency model (`§5`).

mod circuit_breaker;
mod rate_limiter;
mod retry;

pub use circuit_breaker::{create_circuit_breaker, CircuitBreaker, CircuitBreakerOptions, CircuitState, ShouldTripFn};
pub use rate_limiter::{create_rate_limiter, RateLimiter, RateLimiterGuard, RateLimiterOptions};
pub use retry::{retry, Backoff, RetryPolicy, ShouldRetryFn};

#[cfg(feature = "async-tokio")]
pub use retry::retry_async;
