//! Retrying a fallible operation with backoff (`C14`, `§4.14`).

use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::brand::ErrorRecord;
use crate::context::{context, ErrorContextExt};
use crate::events::{emit, EventKind, EventPayload};
use crate::taxonomy::tag;
use crate::wrap::wrap;

/// How the delay between attempts grows.
#[derive(Clone, Copy, Debug)]
pub enum Backoff {
    /// `base_delay * attempt`.
    Linear,
    /// `base_delay * 2^(attempt - 1)`.
    Exponential,
}

/// A hook deciding whether a given failure should be retried at all. The
/// attempt number (1-based, the attempt that just failed) is passed along so
/// callers can e.g. only retry the first few attempts for a given class of
/// error.
pub type ShouldRetryFn = Rc<dyn Fn(&ErrorRecord, u32) -> bool>;

/// Configuration for [`retry`].
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first (non-retry) one.
    pub attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
    /// Randomizes each computed delay by a factor in `[0.75, 1.25]`, to
    /// avoid retry storms when many callers back off in lockstep.
    pub jitter: bool,
    pub should_retry: Option<ShouldRetryFn>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(100),
            backoff: Backoff::Exponential,
            jitter: true,
            should_retry: None,
        }
    }
}

/// A cheap, dependency-free jitter source seeded from the clock. Not
/// cryptographically random; only needs to desynchronize concurrent
/// retriers, not resist prediction.
fn jitter_factor() -> f64 {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.subsec_nanos()).unwrap_or(0);
    0.75 + (nanos % 500) as f64 / 1000.0
}

fn delay_for_attempt(policy: &RetryPolicy, attempt: u32) -> Duration {
    let multiplier = match policy.backoff {
        Backoff::Linear => attempt as u32,
        Backoff::Exponential => 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX),
    };
    let base = policy.base_delay.saturating_mul(multiplier.max(1));
    if policy.jitter {
        base.mul_f64(jitter_factor())
    } else {
        base
    }
}

fn should_retry(policy: &RetryPolicy, error: &ErrorRecord, attempt: u32) -> bool {
    match &policy.should_retry {
        Some(predicate) => predicate(error, attempt),
        None => true,
    }
}

fn exhausted_error(last_error: ErrorRecord, attempts: u32) -> ErrorRecord {
    wrap(
        tag::MAX_RETRIES_EXCEEDED,
        last_error,
        Some(format!("exceeded {attempts} attempt(s)")),
        Some(context().with("attempts", attempts as i64)),
    )
}

/// Retries `operation` up to `policy.attempts` times total, honoring
/// backoff between attempts (`P11`: total attempts never exceed
/// `policy.attempts`). The final failure is wrapped as
/// `MaxRetriesExceeded`, with the last raw error as its cause.
pub fn retry<T>(policy: &RetryPolicy, mut operation: impl FnMut(u32) -> Result<T, ErrorRecord>) -> Result<T, ErrorRecord> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match operation(attempt) {
            Ok(value) => {
                if attempt > 1 {
                    emit(EventKind::Recovered, EventPayload::Recovered { attempt });
                }
                return Ok(value);
            }
            Err(error) => {
                let is_last = attempt >= policy.attempts;
                if is_last || !should_retry(policy, &error, attempt) {
                    return Err(if is_last { exhausted_error(error, attempt) } else { error });
                }
                emit(EventKind::Retry, EventPayload::Retry { error: &error, attempt });
                std::thread::sleep(delay_for_attempt(policy, attempt));
            }
        }
    }
}

/// The async counterpart of [`retry`], sleeping between attempts via
/// `tokio::time::sleep` instead of blocking the thread.
#[cfg(feature = "async-tokio")]
pub async fn retry_async<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, ErrorRecord>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, ErrorRecord>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    emit(EventKind::Recovered, EventPayload::Recovered { attempt });
                }
                return Ok(value);
            }
            Err(error) => {
                let is_last = attempt >= policy.attempts;
                if is_last || !should_retry(policy, &error, attempt) {
                    return Err(if is_last { exhausted_error(error, attempt) } else { error });
                }
                emit(EventKind::Retry, EventPayload::Retry { error: &error, attempt });
                tokio::time::sleep(delay_for_attempt(policy, attempt)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{create_error, CreateErrorOptions};
    use std::cell::Cell;

    fn reset() {
        crate::config::reset_for_test();
        crate::pool::reset_for_test();
        crate::intern::reset_for_test();
    }

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy { attempts, base_delay: Duration::from_millis(0), backoff: Backoff::Linear, jitter: false, should_retry: None }
    }

    #[test]
    fn succeeds_without_retrying_when_first_attempt_works() {
        reset();
        let calls = Cell::new(0);
        let result = retry(&fast_policy(3), |_attempt| {
            calls.set(calls.get() + 1);
            Ok::<_, ErrorRecord>(42)
        });
        assert_eq!(result, Ok(42));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn retries_up_to_attempts_then_wraps_as_max_retries_exceeded() {
        reset();
        let calls = Cell::new(0);
        let result: Result<(), ErrorRecord> = retry(&fast_policy(3), |_attempt| {
            calls.set(calls.get() + 1);
            Err(create_error(CreateErrorOptions::new("boom").error_type("ExternalError")))
        });
        assert_eq!(calls.get(), 3);
        let error = result.unwrap_err();
        assert_eq!(error.error_type(), tag::MAX_RETRIES_EXCEEDED);
    }

    #[test]
    fn recovers_on_a_later_attempt() {
        reset();
        let calls = Cell::new(0);
        let result = retry(&fast_policy(5), |_attempt| {
            let n = calls.get() + 1;
            calls.set(n);
            if n < 3 {
                Err(create_error(CreateErrorOptions::new("boom")))
            } else {
                Ok(n)
            }
        });
        assert_eq!(result, Ok(3));
    }

    #[test]
    fn should_retry_hook_can_veto_further_attempts() {
        reset();
        let calls = Cell::new(0);
        let policy = RetryPolicy {
            should_retry: Some(Rc::new(|_err, attempt| attempt < 2)),
            ..fast_policy(5)
        };
        let result: Result<(), ErrorRecord> = retry(&policy, |_attempt| {
            calls.set(calls.get() + 1);
            Err(create_error(CreateErrorOptions::new("boom")))
        });
        assert_eq!(calls.get(), 2);
        assert!(result.is_err());
    }
}
