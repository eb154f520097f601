//! Ergonomic extension traits layered on top of [`crate::ErrorRecord`] and
//! [`crate::result_sync::TryResult`].
//!
//! Grounded in `but212-error-rail`'s `traits` module (`ResultExt`,
//! `TransientError`): the shapes are the same, adapted from that crate's
//! generic `E` to this crate's single concrete [`ErrorRecord`] type, since
//! every combinator here already settles on one error representation
//! instead of being generic over the caller's own error type.

use crate::brand::ErrorRecord;
use crate::context::{context, ErrorContext, ErrorContextExt};
use crate::result_sync::TryResult;
use crate::taxonomy::tag;

/// The context key [`IntoContext`] uses for a bare string message.
pub const NOTE_KEY: &str = "note";

/// Converts a value into an [`ErrorContext`], for [`ResultExt::ctx`].
pub trait IntoContext {
    fn into_context(self) -> ErrorContext;
}

impl IntoContext for &str {
    fn into_context(self) -> ErrorContext {
        context().with(NOTE_KEY, self)
    }
}

impl IntoContext for String {
    fn into_context(self) -> ErrorContext {
        context().with(NOTE_KEY, self)
    }
}

impl IntoContext for ErrorContext {
    fn into_context(self) -> ErrorContext {
        self
    }
}

/// Extension trait for attaching context to a [`TryResult`] without a
/// verbose `.map_err(|e| e.with_merged_context(...))` chain.
pub trait ResultExt<T> {
    /// Merges a context message into the error branch, eagerly.
    fn ctx<C: IntoContext>(self, msg: C) -> TryResult<T>;

    /// Merges a context message into the error branch, built lazily — the
    /// closure only runs when `self` is already an `Err`.
    fn ctx_with<F, C>(self, f: F) -> TryResult<T>
    where
        F: FnOnce() -> C,
        C: IntoContext;
}

impl<T> ResultExt<T> for TryResult<T> {
    fn ctx<C: IntoContext>(self, msg: C) -> TryResult<T> {
        self.map_err(|error| error.with_merged_context(msg.into_context()))
    }

    fn ctx_with<F, C>(self, f: F) -> TryResult<T>
    where
        F: FnOnce() -> C,
        C: IntoContext,
    {
        self.map_err(|error| error.with_merged_context(f().into_context()))
    }
}

/// Classifies a record as transient (worth retrying) or permanent, by its
/// taxonomy tag (`§7`). Built-in retry already lives in
/// [`crate::resilience::retry`]; this trait exists for callers who want a
/// cheap transience check without driving a full [`crate::resilience::RetryPolicy`] —
/// e.g. to decide whether to log at `warn` or `error`.
pub trait IsTransient {
    /// `true` if this error is a known-temporary condition.
    fn is_transient(&self) -> bool;

    /// `true` if this error should not be expected to succeed on retry.
    fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

impl IsTransient for ErrorRecord {
    fn is_transient(&self) -> bool {
        matches!(
            self.error_type(),
            tag::TIMEOUT_ERROR | tag::NETWORK_ERROR | tag::RATE_LIMITED | tag::CIRCUIT_BREAKER_OPEN
        )
    }
}

/// Extension methods for working with transient errors at the `Result`
/// level, mirroring `but212-error-rail`'s `TransientErrorExt`.
pub trait TransientResultExt<T> {
    /// `Some(self)` if `self` is an `Err` classified as transient,
    /// `None` otherwise (success or a permanent error) — for callers that
    /// use `Option` to decide whether to keep retrying.
    fn retry_if_transient(self) -> Option<TryResult<T>>;
}

impl<T> TransientResultExt<T> for TryResult<T> {
    fn retry_if_transient(self) -> Option<TryResult<T>> {
        match &self {
            Ok(_) => None,
            Err(error) if error.is_transient() => Some(self),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{create_error, CreateErrorOptions};

    fn reset() {
        crate::config::reset_for_test();
        crate::pool::reset_for_test();
        crate::intern::reset_for_test();
    }

    #[test]
    fn ctx_merges_a_bare_string_under_note_key() {
        reset();
        let result: TryResult<i32> = Err(create_error(CreateErrorOptions::new("boom")));
        let result = result.ctx("while parsing input");
        let error = result.unwrap_err();
        let ctx = error.context().expect("ctx should attach context");
        assert_eq!(ctx.get(NOTE_KEY), Some(&crate::context::ContextValue::Str("while parsing input".into())));
    }

    #[test]
    fn ctx_with_only_runs_closure_on_error() {
        reset();
        let called = std::cell::Cell::new(false);
        let ok: TryResult<i32> = Ok(7);
        let ok = ok.ctx_with(|| {
            called.set(true);
            "unused"
        });
        assert_eq!(ok, Ok(7));
        assert!(!called.get());
    }

    #[test]
    fn timeout_and_rate_limited_errors_are_transient() {
        reset();
        let timeout = create_error(CreateErrorOptions::new("timed out").error_type(tag::TIMEOUT_ERROR));
        let validation = create_error(CreateErrorOptions::new("bad input").error_type(tag::VALIDATION_ERROR));
        assert!(timeout.is_transient());
        assert!(!validation.is_transient());
        assert!(validation.is_permanent());
    }

    #[test]
    fn retry_if_transient_only_surfaces_transient_failures() {
        reset();
        let transient: TryResult<i32> =
            Err(create_error(CreateErrorOptions::new("rate limited").error_type(tag::RATE_LIMITED)));
        let permanent: TryResult<i32> =
            Err(create_error(CreateErrorOptions::new("bad input").error_type(tag::VALIDATION_ERROR)));
        assert!(transient.retry_if_transient().is_some());
        assert!(permanent.retry_if_transient().is_none());
    }
}
