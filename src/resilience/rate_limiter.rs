//! Concurrency- and rate-limiting admission control (`C14`).

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::brand::ErrorRecord;
use crate::context::{context, ErrorContextExt};
use crate::factory::{create_error, CreateErrorOptions};
use crate::taxonomy::tag;

/// Configuration for [`RateLimiter::new`].
#[derive(Clone, Copy)]
pub struct RateLimiterOptions {
    /// Maximum number of concurrently admitted callers. `0` means unbounded.
    pub max_concurrent: usize,
    /// Minimum spacing between successive admissions. `Duration::ZERO` means
    /// no spacing requirement.
    pub min_interval: Duration,
}

impl Default for RateLimiterOptions {
    fn default() -> Self {
        RateLimiterOptions { max_concurrent: 1, min_interval: Duration::ZERO }
    }
}

struct Inner {
    options: RateLimiterOptions,
    active: usize,
    queue_size: usize,
    last_start: Option<Instant>,
}

/// Gates concurrent access and minimum-interval spacing to a protected
/// operation (`§4.14`). Cheaply `Clone`-able; clones share state.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Rc<RefCell<Inner>>,
}

/// Releases one admitted slot when dropped, whether the guarded call
/// succeeded, failed, or panicked.
pub struct RateLimiterGuard {
    inner: Rc<RefCell<Inner>>,
}

impl Drop for RateLimiterGuard {
    fn drop(&mut self) {
        self.inner.borrow_mut().active -= 1;
    }
}

impl RateLimiter {
    pub fn new(options: RateLimiterOptions) -> Self {
        RateLimiter {
            inner: Rc::new(RefCell::new(Inner {
                options,
                active: 0,
                queue_size: 0,
                last_start: None,
            })),
        }
    }

    /// Number of callers currently admitted.
    pub fn active_count(&self) -> usize {
        self.inner.borrow().active
    }

    /// Number of callers parked in [`Self::acquire`], waiting to be admitted.
    pub fn queue_size(&self) -> usize {
        self.inner.borrow().queue_size
    }

    fn ready(inner: &Inner) -> bool {
        let under_concurrency = inner.options.max_concurrent == 0 || inner.active < inner.options.max_concurrent;
        let spaced = inner
            .last_start
            .map(|at| at.elapsed() >= inner.options.min_interval)
            .unwrap_or(true);
        under_concurrency && spaced
    }

    /// Attempts to admit one caller without blocking. On success, returns a
    /// guard that releases the slot on drop; on failure, returns a
    /// `RateLimited` error without touching the limiter's state.
    pub fn try_acquire(&self) -> Result<RateLimiterGuard, ErrorRecord> {
        let mut inner = self.inner.borrow_mut();
        if !Self::ready(&inner) {
            return Err(create_error(
                CreateErrorOptions::new("rate limit exceeded")
                    .error_type(tag::RATE_LIMITED)
                    .context(context().with("active", inner.active as i64)),
            ));
        }
        inner.active += 1;
        inner.last_start = Some(Instant::now());
        drop(inner);
        Ok(RateLimiterGuard { inner: self.inner.clone() })
    }

    /// Waits until a slot is available, polling at a short fixed interval.
    /// Counts itself in [`Self::queue_size`] while parked.
    #[cfg(feature = "async-tokio")]
    pub async fn acquire(&self) -> RateLimiterGuard {
        const POLL_INTERVAL: Duration = Duration::from_millis(5);
        self.inner.borrow_mut().queue_size += 1;
        loop {
            match self.try_acquire() {
                Ok(guard) => {
                    self.inner.borrow_mut().queue_size -= 1;
                    return guard;
                }
                Err(_) => tokio::time::sleep(POLL_INTERVAL).await,
            }
        }
    }
}

/// Builds a rate limiter from `options` (`§6`: `createRateLimiter`).
pub fn create_rate_limiter(options: RateLimiterOptions) -> RateLimiter {
    RateLimiter::new(options)
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
    fn admits_up_to_max_concurrent() {
        reset();
        let limiter = create_rate_limiter(RateLimiterOptions { max_concurrent: 2, min_interval: Duration::ZERO });
        let g1 = limiter.try_acquire().expect("first admitted");
        let g2 = limiter.try_acquire().expect("second admitted");
        assert_eq!(limiter.active_count(), 2);
        let err = limiter.try_acquire();
        assert!(err.is_err());
        assert_eq!(err.unwrap_err().error_type(), tag::RATE_LIMITED);
        drop(g1);
        assert_eq!(limiter.active_count(), 1);
        drop(g2);
    }

    #[test]
    fn releasing_a_guard_frees_a_slot() {
        reset();
        let limiter = create_rate_limiter(RateLimiterOptions { max_concurrent: 1, min_interval: Duration::ZERO });
        let guard = limiter.try_acquire().expect("admitted");
        assert!(limiter.try_acquire().is_err());
        drop(guard);
        assert!(limiter.try_acquire().is_ok());
    }

    #[test]
    fn min_interval_blocks_back_to_back_admission() {
        reset();
        let limiter = create_rate_limiter(RateLimiterOptions {
            max_concurrent: 0,
            min_interval: Duration::from_secs(60),
        });
        let guard = limiter.try_acquire().expect("first admitted");
        drop(guard);
        let err = limiter.try_acquire();
        assert!(err.is_err());
    }
}
