//! Asynchronous `Result` combinators (`C11`).
//!
//! Suspension only happens inside these combinators, `retry`/`retry_async`,
//! and the rate limiter's `acquire` (`§5`). Every combinator here applies
//! the active middleware pipeline exactly once, at its own outermost
//! boundary, the same way [`crate::result_sync`]'s originating combinators
//! do.

mod cancel;
mod future_ext;

pub use cancel::CancelToken;
pub use future_ext::{ContextFuture, FutureResultExt};

use std::future::Future;
use std::time::{Duration, Instant};

use crate::brand::ErrorRecord;
use crate::context::{context, ErrorContext, ErrorContextExt};
use crate::factory::{create_error, CreateErrorOptions};
use crate::middleware::global_pipeline;
use crate::result_sync::{multiple_errors, TryResult};
use crate::taxonomy::tag;

fn apply_pipeline(error: ErrorRecord) -> ErrorRecord {
    global_pipeline().run(error)
}

/// Options accepted by [`try_async`]/[`try_await`].
#[derive(Default)]
pub struct TryAsyncOptions {
    pub timeout: Option<Duration>,
    pub signal: Option<CancelToken>,
    pub error_type: Option<String>,
    pub message: Option<String>,
    pub context: Option<ErrorContext>,
}

fn timeout_error(elapsed: Duration, options: &TryAsyncOptions) -> ErrorRecord {
    let message = options.message.clone().unwrap_or_else(|| format!("timed out after {elapsed:?}"));
    let ctx = options.context.clone().unwrap_or_else(context).with("elapsed_ms", elapsed.as_millis() as i64);
    create_error(
        CreateErrorOptions::new(message)
            .error_type(options.error_type.clone().unwrap_or_else(|| tag::TIMEOUT_ERROR.to_owned()))
            .context(ctx),
    )
}

fn aborted_error(options: &TryAsyncOptions) -> ErrorRecord {
    let message = options.message.clone().unwrap_or_else(|| "operation was aborted".to_owned());
    let ctx = options.context.clone().unwrap_or_else(context);
    create_error(
        CreateErrorOptions::new(message)
            .error_type(options.error_type.clone().unwrap_or_else(|| tag::ABORTED.to_owned()))
            .context(ctx),
    )
}

/// Runs `f`, racing it against an optional `timeout` and an optional
/// external `signal` (`§4.11`). `f` receives a [`CancelToken`] it should
/// observe cooperatively; that token is aborted the moment either race
/// condition fires.
///
/// If both a timeout and an external signal are supplied, whichever fires
/// first determines the error type: `TimeoutError` or `ABORTED` (`§4.11`:
/// "the first to fire wins").
pub async fn try_async<T, F, Fut>(f: F, options: TryAsyncOptions) -> TryResult<T>
where
    F: FnOnce(CancelToken) -> Fut,
    Fut: Future<Output = T>,
{
    let internal = CancelToken::new();
    let mut parents = Vec::new();
    if let Some(signal) = &options.signal {
        parents.push(signal.clone());
    }
    let (combined, _guard) = if parents.is_empty() {
        (internal.clone(), None)
    } else {
        let (child, guard) = CancelToken::linked_child(&parents);
        (child, Some(guard))
    };

    let started = Instant::now();
    let operation = f(combined.clone());
    tokio::pin!(operation);

    let outcome = match options.timeout {
        Some(duration) => {
            tokio::select! {
                value = &mut operation => Ok(value),
                _ = tokio::time::sleep(duration) => {
                    internal.abort();
                    combined.abort();
                    Err(TimeoutOrAbort::TimedOut)
                }
                _ = wait_for_external(options.signal.clone()) => {
                    combined.abort();
                    Err(TimeoutOrAbort::Aborted)
                }
            }
        }
        None => {
            tokio::select! {
                value = &mut operation => Ok(value),
                _ = wait_for_external(options.signal.clone()) => {
                    combined.abort();
                    Err(TimeoutOrAbort::Aborted)
                }
            }
        }
    };

    match outcome {
        Ok(value) => Ok(value),
        Err(TimeoutOrAbort::TimedOut) => Err(apply_pipeline(timeout_error(started.elapsed(), &options))),
        Err(TimeoutOrAbort::Aborted) => Err(apply_pipeline(aborted_error(&options))),
    }
}

enum TimeoutOrAbort {
    TimedOut,
    Aborted,
}

async fn wait_for_external(signal: Option<CancelToken>) {
    match signal {
        Some(signal) => signal.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Like [`try_async`], but wraps an existing future instead of taking a
/// closure that builds one from a token. The future has no way to observe
/// cancellation cooperatively; it is simply left to run to completion in
/// the background if the call settles via timeout or abort.
pub async fn try_await<T, Fut>(future: Fut, options: TryAsyncOptions) -> TryResult<T>
where
    Fut: Future<Output = T>,
{
    try_async(move |_token| future, options).await
}

/// Polls every future in `futures` concurrently within this task (the
/// crate's single-threaded cooperative model, `§5`, needs no OS-level
/// parallelism to race them). Returns `Err` as soon as any future
/// resolves to an error, without waiting on the rest; returns `Ok` with
/// every success, in input order, once all have resolved successfully.
async fn join_or_first_err<Fut, T>(futures: Vec<Fut>) -> TryResult<Vec<T>>
where
    Fut: Future<Output = TryResult<T>>,
{
    let mut slots: Vec<Option<std::pin::Pin<Box<Fut>>>> = futures.into_iter().map(|f| Some(Box::pin(f))).collect();
    let mut results: Vec<Option<T>> = slots.iter().map(|_| None).collect();
    std::future::poll_fn(move |cx| {
        let mut all_done = true;
        for (slot, result_slot) in slots.iter_mut().zip(results.iter_mut()) {
            if let Some(fut) = slot {
                match fut.as_mut().poll(cx) {
                    std::task::Poll::Ready(Ok(value)) => {
                        *result_slot = Some(value);
                        *slot = None;
                    }
                    std::task::Poll::Ready(Err(error)) => return std::task::Poll::Ready(Err(error)),
                    std::task::Poll::Pending => all_done = false,
                }
            }
        }
        if all_done {
            std::task::Poll::Ready(Ok(std::mem::take(&mut results).into_iter().map(Option::unwrap).collect()))
        } else {
            std::task::Poll::Pending
        }
    })
    .await
}

/// Polls every future in `futures` concurrently. Returns `Ok` as soon as
/// any future resolves successfully, without waiting on the rest; if every
/// future resolves to an error, returns every error, in input order.
async fn race_first_ok<Fut, T>(futures: Vec<Fut>) -> Result<T, Vec<ErrorRecord>>
where
    Fut: Future<Output = TryResult<T>>,
{
    let mut slots: Vec<Option<std::pin::Pin<Box<Fut>>>> = futures.into_iter().map(|f| Some(Box::pin(f))).collect();
    let mut errors: Vec<Option<ErrorRecord>> = slots.iter().map(|_| None).collect();
    std::future::poll_fn(move |cx| {
        let mut all_done = true;
        for (slot, error_slot) in slots.iter_mut().zip(errors.iter_mut()) {
            if let Some(fut) = slot {
                match fut.as_mut().poll(cx) {
                    std::task::Poll::Ready(Ok(value)) => return std::task::Poll::Ready(Ok(value)),
                    std::task::Poll::Ready(Err(error)) => {
                        *error_slot = Some(error);
                        *slot = None;
                    }
                    std::task::Poll::Pending => all_done = false,
                }
            }
        }
        if all_done {
            std::task::Poll::Ready(Err(std::mem::take(&mut errors).into_iter().flatten().collect()))
        } else {
            std::task::Poll::Pending
        }
    })
    .await
}

/// Runs every future in `operations` concurrently; short-circuits on the
/// first error, aborting the rest via a shared token (`§4.11`). Successes
/// are returned in input order.
pub async fn try_all_async<T, F, Fut>(operations: Vec<F>) -> TryResult<Vec<T>>
where
    F: FnOnce(CancelToken) -> Fut,
    Fut: Future<Output = TryResult<T>>,
{
    let shared = CancelToken::new();
    let futures: Vec<Fut> = operations.into_iter().map(|f| f(shared.clone())).collect();
    match join_or_first_err(futures).await {
        Ok(values) => Ok(values),
        Err(error) => {
            shared.abort();
            Err(apply_pipeline(error))
        }
    }
}

/// Races every future in `operations` concurrently; resolves with the
/// first success by wall-clock. If every one fails, resolves with a
/// `MultipleErrors` aggregate listing each constituent error in start
/// order (`§4.11`).
pub async fn try_any_async<T, F, Fut>(operations: Vec<F>) -> TryResult<T>
where
    F: FnOnce(CancelToken) -> Fut,
    Fut: Future<Output = TryResult<T>>,
{
    let shared = CancelToken::new();
    let futures: Vec<Fut> = operations.into_iter().map(|f| f(shared.clone())).collect();
    match race_first_ok(futures).await {
        Ok(value) => {
            shared.abort();
            Ok(value)
        }
        Err(errors) => Err(apply_pipeline(multiple_errors(errors))),
    }
}

/// Tries each future in `operations` in order, returning the first
/// success. Unlike [`try_any_async`], later operations are not even
/// started once an earlier one succeeds (`§4.11`).
pub async fn try_any_sequential<T, F, Fut>(operations: Vec<F>) -> TryResult<T>
where
    F: FnOnce(CancelToken) -> Fut,
    Fut: Future<Output = TryResult<T>>,
{
    let mut errors = Vec::new();
    for operation in operations {
        let token = CancelToken::new();
        match operation(token).await {
            Ok(value) => return Ok(value),
            Err(error) => errors.push(error),
        }
    }
    Err(apply_pipeline(multiple_errors(errors)))
}

/// Standalone timeout wrapper around an already-produced result future
/// (`§4.11`: `withTimeout`).
pub async fn with_timeout<T, Fut>(result: Fut, duration: Duration, message: Option<String>) -> TryResult<T>
where
    Fut: Future<Output = TryResult<T>>,
{
    let started = Instant::now();
    tokio::select! {
        value = result => value,
        _ = tokio::time::sleep(duration) => {
            let options = TryAsyncOptions { timeout: Some(duration), message, ..Default::default() };
            Err(apply_pipeline(timeout_error(started.elapsed(), &options)))
        }
    }
}

/// Runs `f` with a progress-reporting callback (`§4.11`: `withProgress`).
/// `on_progress` is invoked synchronously by `f` at whatever granularity it
/// chooses; this wrapper adds no buffering or rate limiting of its own.
pub async fn with_progress<T, F, Fut>(f: F, on_progress: impl Fn(f64) + 'static) -> T
where
    F: FnOnce(std::rc::Rc<dyn Fn(f64)>) -> Fut,
    Fut: Future<Output = T>,
{
    f(std::rc::Rc::new(on_progress)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::CreateErrorOptions;

    fn reset() {
        crate::config::reset_for_test();
        crate::pool::reset_for_test();
        crate::intern::reset_for_test();
        crate::middleware::reset_for_test();
    }

    #[tokio::test]
    async fn resolves_with_value_when_operation_finishes_first() {
        reset();
        let result = try_async(|_token| async { 42 }, TryAsyncOptions::default()).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn timeout_wins_when_operation_never_resolves() {
        reset();
        let options = TryAsyncOptions { timeout: Some(Duration::from_millis(5)), ..Default::default() };
        let result: TryResult<()> = try_async(|_token| std::future::pending(), options).await;
        let error = result.unwrap_err();
        assert_eq!(error.error_type(), tag::TIMEOUT_ERROR);
    }

    #[tokio::test]
    async fn external_abort_wins_over_a_never_resolving_future() {
        reset();
        let signal = CancelToken::new();
        let abort_signal = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            abort_signal.abort();
        });
        let options = TryAsyncOptions { signal: Some(signal), ..Default::default() };
        let result: TryResult<()> = try_async(|_token| std::future::pending(), options).await;
        let error = result.unwrap_err();
        assert_eq!(error.error_type(), tag::ABORTED);
    }

    #[tokio::test]
    async fn try_all_async_short_circuits_on_first_error() {
        reset();
        let ops: Vec<Box<dyn FnOnce(CancelToken) -> std::pin::Pin<Box<dyn Future<Output = TryResult<i32>>>>>> = vec![
            Box::new(|_t| Box::pin(async { Ok(1) })),
            Box::new(|_t| Box::pin(async { Err(create_error(CreateErrorOptions::new("bad"))) })),
        ];
        let result = try_all_async(ops).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn try_any_async_aggregates_when_all_fail() {
        reset();
        let ops: Vec<Box<dyn FnOnce(CancelToken) -> std::pin::Pin<Box<dyn Future<Output = TryResult<i32>>>>>> = vec![
            Box::new(|_t| Box::pin(async { Err(create_error(CreateErrorOptions::new("a").error_type("A"))) })),
            Box::new(|_t| Box::pin(async { Err(create_error(CreateErrorOptions::new("b").error_type("B"))) })),
        ];
        let result = try_any_async(ops).await;
        let error = result.unwrap_err();
        assert_eq!(error.error_type(), tag::MULTIPLE_ERRORS);
    }

    #[tokio::test]
    async fn try_any_sequential_stops_at_first_success() {
        reset();
        let attempted = std::rc::Rc::new(std::cell::Cell::new(0));
        let a1 = attempted.clone();
        let a2 = attempted.clone();
        let ops: Vec<Box<dyn FnOnce(CancelToken) -> std::pin::Pin<Box<dyn Future<Output = TryResult<i32>>>>>> = vec![
            Box::new(move |_t| {
                a1.set(a1.get() + 1);
                Box::pin(async { Ok(1) })
            }),
            Box::new(move |_t| {
                a2.set(a2.get() + 1);
                Box::pin(async { Ok(2) })
            }),
        ];
        let result = try_any_sequential(ops).await;
        assert_eq!(result, Ok(1));
        assert_eq!(attempted.get(), 1);
    }
}
