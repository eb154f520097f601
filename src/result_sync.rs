//! Synchronous `Result` combinators (`C10`).
//!
//! Every combinator here traffics in plain `std::result::Result<T,
//! ErrorRecord>` — no brand check is needed to discriminate success from
//! failure inside the crate, since the Rust `enum` already is the sum type
//! `§9`'s design note asks for (`Ok(T) | Err(E)`). The brand
//! ([`crate::is_error`]) remains useful only at `dyn Any`/panic-payload
//! boundaries, which is exactly where [`try_sync`] uses it.

use std::panic::{catch_unwind, UnwindSafe};

use crate::brand::ErrorRecord;
use crate::context::{context, ContextValue, ErrorContext, ErrorContextExt};
use crate::factory::{create_error, CreateErrorOptions};
use crate::middleware::global_pipeline;
use crate::taxonomy::tag;
use crate::wrap::from_panic;

/// A `Result` specialized to this crate's branded error type.
pub type TryResult<T> = Result<T, ErrorRecord>;

/// Runs `error` through the active (thread-local) middleware pipeline.
/// Called once, at the outermost boundary, by the combinators that
/// *originate* a result from a fallible operation (`try_sync`,
/// `try_sync_tuple`, `try_all`, `combine_errors`) — not by combinators that
/// only reshape an already-produced result (`try_map`, `try_chain`,
/// `match_try_result`), so that a chain of combinators applies the
/// pipeline exactly once overall rather than once per link (`§4.10`).
fn apply_pipeline(error: ErrorRecord) -> ErrorRecord {
    global_pipeline().run(error)
}

/// Invokes `f`; returns its value by identity on success, and a branded
/// error wrapping any unwind on failure (`P1`: `try_sync(fn) === fn()` for
/// any non-panicking `fn`).
///
/// Zero overhead on the success path: `f`'s return value is moved out
/// directly, never boxed or brand-checked.
pub fn try_sync<T, F>(f: F) -> TryResult<T>
where
    F: FnOnce() -> T + UnwindSafe,
{
    match catch_unwind(f) {
        Ok(value) => Ok(value),
        Err(payload) => Err(apply_pipeline(from_panic(payload, None))),
    }
}

/// Options accepted by [`try_sync_with_options`]: an override for the
/// classified `error_type`/`message`, and context to attach.
#[derive(Default)]
pub struct TrySyncOptions {
    pub error_type: Option<String>,
    pub message: Option<String>,
    pub context: Option<ErrorContext>,
}

/// Like [`try_sync`], but lets the caller override the classified
/// `error_type`/`message` (via [`crate::wrap::wrap`]) and attach context to
/// the resulting error (`§4.10`: "optional `errorType`/`message` override
/// via `wrap`").
pub fn try_sync_with_options<T, F>(f: F, options: TrySyncOptions) -> TryResult<T>
where
    F: FnOnce() -> T + UnwindSafe,
{
    match catch_unwind(f) {
        Ok(value) => Ok(value),
        Err(payload) => {
            let classified = from_panic(payload, options.context.clone());
            let error = if options.error_type.is_some() || options.message.is_some() {
                let error_type = options.error_type.unwrap_or_else(|| classified.error_type().to_owned());
                crate::wrap::wrap(error_type, classified, options.message, options.context)
            } else {
                classified
            };
            Err(apply_pipeline(error))
        }
    }
}

/// The tuple form of [`try_sync`]: `(Some(value), None)` on success,
/// `(None, Some(error))` on failure.
pub fn try_sync_tuple<T, F>(f: F) -> (Option<T>, Option<ErrorRecord>)
where
    F: FnOnce() -> T + UnwindSafe,
{
    match try_sync(f) {
        Ok(value) => (Some(value), None),
        Err(error) => (None, Some(error)),
    }
}

/// `true` if `result` is the success branch.
pub fn is_ok<T>(result: &TryResult<T>) -> bool {
    result.is_ok()
}

/// `true` if `result` is the error branch. Equivalent to
/// [`crate::is_error`] applied to the error branch (`P3`).
pub fn is_err<T>(result: &TryResult<T>) -> bool {
    result.is_err()
}

/// Returns the success value, or panics carrying the error's `Display`
/// text (optionally prefixed by `message`). This is the one combinator the
/// spec allows to throw intentionally (`§7`).
pub fn unwrap<T>(result: TryResult<T>, message: Option<&str>) -> T {
    match result {
        Ok(value) => value,
        Err(error) => match message {
            Some(prefix) => panic!("{prefix}: {error}"),
            None => panic!("{error}"),
        },
    }
}

/// Returns the success value, or `default` if `result` is an error.
pub fn unwrap_or<T>(result: TryResult<T>, default: T) -> T {
    result.unwrap_or(default)
}

/// Returns the success value, or the result of applying `f` to the error.
pub fn unwrap_or_else<T>(result: TryResult<T>, f: impl FnOnce(ErrorRecord) -> T) -> T {
    result.unwrap_or_else(f)
}

/// Maps the success branch through `f`; passes an error through unchanged.
pub fn try_map<T, U>(result: TryResult<T>, f: impl FnOnce(T) -> U) -> TryResult<U> {
    result.map(f)
}

/// Flat-maps the success branch through `f`; passes an error through
/// unchanged.
pub fn try_chain<T, U>(result: TryResult<T>, f: impl FnOnce(T) -> TryResult<U>) -> TryResult<U> {
    result.and_then(f)
}

/// Exhaustively handles `result` via `ok`/`err`, each producing the same
/// type `R`.
pub fn match_try_result<T, R>(
    result: TryResult<T>,
    ok: impl FnOnce(T) -> R,
    err: impl FnOnce(ErrorRecord) -> R,
) -> R {
    match result {
        Ok(value) => ok(value),
        Err(error) => err(error),
    }
}

/// Short-circuits on the first error, preserving the order of successes
/// otherwise. The short-circuiting error is routed through the middleware
/// pipeline as the outermost boundary of this combinator.
pub fn try_all<T>(results: Vec<TryResult<T>>) -> TryResult<Vec<T>> {
    let mut out = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(value) => out.push(value),
            Err(error) => return Err(apply_pipeline(error)),
        }
    }
    Ok(out)
}

/// Returns the first success in `results`, in order; if every entry is an
/// error, returns a `MultipleErrors` aggregate listing each constituent
/// error in input order (`§4.10`/`§6`: the synchronous counterpart of
/// [`crate::result_async::try_any_async`]/`try_any_sequential`).
pub fn try_any<T>(results: Vec<TryResult<T>>) -> TryResult<T> {
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(value) => return Ok(value),
            Err(error) => errors.push(error),
        }
    }
    Err(multiple_errors(errors))
}

/// Splits `results` into `(successes, errors)`, preserving relative order
/// within each half.
pub fn partition_results<T>(results: Vec<TryResult<T>>) -> (Vec<T>, Vec<ErrorRecord>) {
    let mut successes = Vec::new();
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(value) => successes.push(value),
            Err(error) => errors.push(error),
        }
    }
    (successes, errors)
}

/// Keeps only the success values, discarding errors.
pub fn filter_success<T>(results: Vec<TryResult<T>>) -> Vec<T> {
    results.into_iter().filter_map(Result::ok).collect()
}

/// Keeps only the error values, discarding successes.
pub fn filter_errors<T>(results: Vec<TryResult<T>>) -> Vec<ErrorRecord> {
    results.into_iter().filter_map(Result::err).collect()
}

/// A compact `{type, message, source}` view of an error, used by
/// [`combine_errors`] and [`crate::result_async::try_any_async`]'s
/// aggregated `MultipleErrors` context.
pub(crate) fn error_summary(error: &ErrorRecord) -> ContextValue {
    ContextValue::Map(
        context()
            .with("type", error.error_type())
            .with("message", error.message())
            .with("source", error.source()),
    )
}

/// Combines several errors into one `error_type`-tagged record whose
/// `context.errors` lists each constituent error's `{type, message,
/// source}`, in input order.
pub fn combine_errors(errors: Vec<ErrorRecord>, error_type: impl Into<String>, message: impl Into<String>) -> ErrorRecord {
    let summaries: Vec<ContextValue> = errors.iter().map(error_summary).collect();
    let ctx = context().with("errors", ContextValue::List(summaries)).with("count", errors.len() as i64);
    let record = create_error(
        CreateErrorOptions::new(message.into()).error_type(error_type.into()).context(ctx),
    );
    apply_pipeline(record)
}

/// Builds the `MultipleErrors`-tagged aggregate used when every branch of
/// a disjunctive combinator fails (`§4.11`).
pub(crate) fn multiple_errors(errors: Vec<ErrorRecord>) -> ErrorRecord {
    combine_errors(errors, tag::MULTIPLE_ERRORS, "all attempts failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config, intern, middleware, pool};

    fn reset() {
        config::reset_for_test();
        pool::reset_for_test();
        intern::reset_for_test();
        middleware::reset_for_test();
    }

    #[test]
    fn identity_on_success() {
        reset();
        let result = try_sync(|| 2 + 2);
        assert_eq!(result, Ok(4));
    }

    #[test]
    fn panic_becomes_branded_error() {
        reset();
        let result: TryResult<i32> = try_sync(|| panic!("boom"));
        assert!(is_err(&result));
        let error = result.unwrap_err();
        assert_eq!(error.message(), "boom");
    }

    #[test]
    fn tuple_form_mirrors_try_sync() {
        reset();
        let (value, error) = try_sync_tuple(|| "ok");
        assert_eq!(value, Some("ok"));
        assert!(error.is_none());
    }

    #[test]
    fn unwrap_or_falls_back_on_error() {
        reset();
        let result: TryResult<i32> = try_sync(|| panic!("nope"));
        assert_eq!(unwrap_or(result, -1), -1);
    }

    #[test]
    fn try_map_only_touches_success() {
        reset();
        let doubled = try_map(try_sync(|| 21), |n: i32| n * 2);
        assert_eq!(doubled, Ok(42));
    }

    #[test]
    #[should_panic(expected = "context: boom")]
    fn unwrap_panics_with_prefix_on_error() {
        reset();
        let result: TryResult<i32> = try_sync(|| panic!("boom"));
        unwrap(result, Some("context"));
    }

    #[test]
    fn try_all_short_circuits_on_first_error() {
        reset();
        let results: Vec<TryResult<i32>> =
            vec![Ok(1), Err(create_error(CreateErrorOptions::new("bad"))), Ok(3)];
        let combined = try_all(results);
        assert!(combined.is_err());
    }

    #[test]
    fn try_all_preserves_order_on_success() {
        reset();
        let results: Vec<TryResult<i32>> = vec![Ok(1), Ok(2), Ok(3)];
        assert_eq!(try_all(results), Ok(vec![1, 2, 3]));
    }

    #[test]
    fn try_any_returns_first_success() {
        reset();
        let results: Vec<TryResult<i32>> =
            vec![Err(create_error(CreateErrorOptions::new("bad"))), Ok(2), Ok(3)];
        assert_eq!(try_any(results), Ok(2));
    }

    #[test]
    fn try_any_aggregates_when_all_fail() {
        reset();
        let results: Vec<TryResult<i32>> = vec![
            Err(create_error(CreateErrorOptions::new("a").error_type("A"))),
            Err(create_error(CreateErrorOptions::new("b").error_type("B"))),
        ];
        let combined = try_any(results);
        let error = combined.unwrap_err();
        assert_eq!(error.error_type(), tag::MULTIPLE_ERRORS);
    }

    #[test]
    fn partition_splits_successes_and_errors() {
        reset();
        let results: Vec<TryResult<i32>> =
            vec![Ok(1), Err(create_error(CreateErrorOptions::new("bad"))), Ok(3)];
        let (successes, errors) = partition_results(results);
        assert_eq!(successes, vec![1, 3]);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn combine_errors_lists_each_constituent() {
        reset();
        let errors = vec![
            create_error(CreateErrorOptions::new("a").error_type("A")),
            create_error(CreateErrorOptions::new("b").error_type("B")),
        ];
        let combined = combine_errors(errors, "Batch", "two failed");
        assert_eq!(combined.error_type(), "Batch");
        let ContextValue::Int(count) = combined.context().unwrap().get("count").unwrap() else {
            panic!("expected count")
        };
        assert_eq!(*count, 2);
    }
}
