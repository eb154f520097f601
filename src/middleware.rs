//! Ordered, composable middleware pipeline over error records (`C12`).
//!
//! The spec frames a middleware as `(result, next) -> result`, but every
//! provided middleware (`§4.12`) only ever inspects or rewrites the *error*
//! branch — the success branch is returned by identity per the Result
//! Combinators' own invariant (`§3.1`, "combinators MUST NOT wrap success
//! values"). So here a [`Middleware`] closes over [`ErrorRecord`] directly;
//! [`crate::result_sync`]/[`crate::result_async`] combinators apply the
//! active pipeline to the error branch exactly once, at the outermost
//! boundary, and leave a success value untouched.

use std::cell::RefCell;
use std::rc::Rc;

use crate::brand::ErrorRecord;
use crate::context::{context, ErrorContext, ErrorContextExt};
use crate::events::{emit, EventKind, EventPayload};

/// A single step in a [`MiddlewarePipeline`].
pub trait Middleware {
    /// Receives the current error and a handle to the remaining pipeline.
    /// Call `next.run(error)` to continue; returning without calling `next`
    /// short-circuits the remaining middlewares.
    fn call(&self, error: ErrorRecord, next: Next<'_>) -> ErrorRecord;
}

impl<F: Fn(ErrorRecord, Next<'_>) -> ErrorRecord> Middleware for F {
    fn call(&self, error: ErrorRecord, next: Next<'_>) -> ErrorRecord {
        self(error, next)
    }
}

/// A handle to the remaining middlewares in a pipeline run.
pub struct Next<'a> {
    remaining: &'a [Rc<dyn Middleware>],
}

impl<'a> Next<'a> {
    /// Runs the next middleware in line, or returns `error` unchanged if
    /// the pipeline is exhausted.
    pub fn run(self, error: ErrorRecord) -> ErrorRecord {
        match self.remaining.split_first() {
            Some((middleware, rest)) => middleware.call(error, Next { remaining: rest }),
            None => error,
        }
    }
}

/// An immutable, ordered snapshot of middlewares (`§3.1`: "pipelines are
/// immutable snapshots; mutation produces a new pipeline").
#[derive(Clone)]
pub struct MiddlewarePipeline {
    stack: Rc<[Rc<dyn Middleware>]>,
}

impl Default for MiddlewarePipeline {
    fn default() -> Self {
        MiddlewarePipeline { stack: Rc::from(Vec::new().into_boxed_slice()) }
    }
}

impl MiddlewarePipeline {
    /// An empty pipeline; running it returns the error unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new pipeline with `middleware` appended, in insertion
    /// order (`§4.12`). Does not mutate `self`.
    #[must_use]
    pub fn with(&self, middleware: Rc<dyn Middleware>) -> Self {
        let mut stack: Vec<Rc<dyn Middleware>> = self.stack.to_vec();
        stack.push(middleware);
        MiddlewarePipeline { stack: Rc::from(stack.into_boxed_slice()) }
    }

    /// Runs every middleware in order against `error`, emitting
    /// `errorTransformed` once the pipeline has finished.
    pub fn run(&self, error: ErrorRecord) -> ErrorRecord {
        if self.stack.is_empty() {
            return error;
        }
        let result = Next { remaining: &self.stack }.run(error);
        emit(EventKind::Transformed, EventPayload::Transformed { record: &result, middleware: "pipeline" });
        result
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }
}

/// Combines several middlewares into a single one that runs them in order,
/// as if they'd all been pushed onto the same [`MiddlewarePipeline`].
pub fn compose(middlewares: Vec<Rc<dyn Middleware>>) -> Rc<dyn Middleware> {
    Rc::new(move |error, next: Next<'_>| {
        let pipeline = MiddlewarePipeline { stack: Rc::from(middlewares.clone().into_boxed_slice()) };
        let transformed = pipeline.run(error);
        next.run(transformed)
    })
}

/// Logs every error that passes through, then forwards it unchanged.
pub fn logging_middleware(logger: impl Fn(&ErrorRecord) + 'static) -> Rc<dyn Middleware> {
    Rc::new(move |error: ErrorRecord, next: Next<'_>| {
        logger(&error);
        next.run(error)
    })
}

/// Rewrites an error via `f`, then forwards the rewritten value.
///
/// `f` MUST return an error (never discard the error-ness of its input);
/// callers running in development mode are expected to assert this
/// themselves, per `§7`'s "programmer error, detected in development
/// mode" clause — this crate cannot check it generically since `f`'s
/// return type is already `ErrorRecord`.
pub fn transform_middleware(f: impl Fn(ErrorRecord) -> ErrorRecord + 'static) -> Rc<dyn Middleware> {
    Rc::new(move |error: ErrorRecord, next: Next<'_>| next.run(f(error)))
}

/// Applies `inner` only when `predicate(&error)` holds; otherwise forwards
/// the error unchanged to the rest of the pipeline.
pub fn filter_middleware(
    predicate: impl Fn(&ErrorRecord) -> bool + 'static,
    inner: Rc<dyn Middleware>,
) -> Rc<dyn Middleware> {
    Rc::new(move |error: ErrorRecord, next: Next<'_>| {
        if predicate(&error) {
            inner.call(error, next)
        } else {
            next.run(error)
        }
    })
}

/// Merges `supplier()`'s context into the error's (forced) context,
/// then forwards it.
pub fn enrich_context_middleware(
    supplier: impl Fn() -> ErrorContext + 'static,
) -> Rc<dyn Middleware> {
    Rc::new(move |error: ErrorRecord, next: Next<'_>| {
        next.run(error.with_merged_context(supplier()))
    })
}

/// Tags every passing error with the retry policy's configured attempt
/// budget, then forwards it (`§4.12`: integrates with `C14`).
///
/// The pipeline only ever sees the *final*, already-exhausted error a
/// retrying combinator produced (`MaxRetriesExceeded`) — it has no way to
/// intercept individual attempts, since a middleware here runs once per
/// combinator call, not once per retry. Attach [`crate::resilience::retry`]
/// around the operation itself for per-attempt behavior; use this
/// middleware only to annotate the outcome.
pub fn retry_middleware(max_attempts: u32) -> Rc<dyn Middleware> {
    Rc::new(move |error: ErrorRecord, next: Next<'_>| {
        next.run(error.with_merged_context(context().with("retry_max_attempts", max_attempts as i64)))
    })
}

/// Tags every passing error with the rate limiter's current occupancy,
/// then forwards it (`§4.12`). Like [`retry_middleware`], this observes
/// rather than gates: the limiter's `try_acquire`/`acquire` must run
/// *before* the guarded operation for admission control to take effect.
pub fn rate_limit_middleware(limiter: crate::resilience::RateLimiter) -> Rc<dyn Middleware> {
    Rc::new(move |error: ErrorRecord, next: Next<'_>| {
        let ctx = context()
            .with("rate_limiter_active", limiter.active_count() as i64)
            .with("rate_limiter_queue", limiter.queue_size() as i64);
        next.run(error.with_merged_context(ctx))
    })
}

/// Tags every passing error with `breaker`'s current state, then forwards
/// it (`§4.12`). The breaker itself only updates state through
/// [`crate::resilience::CircuitBreaker::call`]/`call_async`, which must
/// wrap the guarded operation directly; this middleware only annotates
/// what the pipeline observes, it does not gate admission.
pub fn circuit_breaker_middleware(breaker: crate::resilience::CircuitBreaker) -> Rc<dyn Middleware> {
    Rc::new(move |error: ErrorRecord, next: Next<'_>| {
        let ctx = context().with("circuit_breaker_state", format!("{:?}", breaker.state()));
        next.run(error.with_merged_context(ctx))
    })
}

thread_local! {
    static GLOBAL_PIPELINE: RefCell<MiddlewarePipeline> = RefCell::new(MiddlewarePipeline::new());
}

/// Replaces the process-wide (thread-local) middleware pipeline that
/// [`crate::result_sync`]/[`crate::result_async`] combinators apply at
/// their outermost boundary.
pub fn set_global_pipeline(pipeline: MiddlewarePipeline) {
    GLOBAL_PIPELINE.with(|cell| *cell.borrow_mut() = pipeline);
}

/// The current process-wide middleware pipeline.
pub fn global_pipeline() -> MiddlewarePipeline {
    GLOBAL_PIPELINE.with(|cell| cell.borrow().clone())
}

/// Appends `middleware` to the process-wide pipeline.
pub fn use_global_middleware(middleware: Rc<dyn Middleware>) {
    GLOBAL_PIPELINE.with(|cell| {
        let mut cell = cell.borrow_mut();
        *cell = cell.with(middleware);
    });
}

/// A named registry mapping a string name to a middleware, for composing
/// pipelines by name (`§3.1`).
#[derive(Default)]
pub struct MiddlewareRegistry {
    entries: std::collections::HashMap<String, Rc<dyn Middleware>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, middleware: Rc<dyn Middleware>) {
        self.entries.insert(name.into(), middleware);
    }

    pub fn get(&self, name: &str) -> Option<Rc<dyn Middleware>> {
        self.entries.get(name).cloned()
    }

    /// Builds a pipeline out of `names`, in the given order. Unknown names
    /// are skipped silently (mirrors a registry miss being a no-op, not a
    /// hard failure, since the spec never defines an error path here).
    pub fn pipeline_for(&self, names: &[&str]) -> MiddlewarePipeline {
        let mut pipeline = MiddlewarePipeline::new();
        for name in names {
            if let Some(middleware) = self.get(name) {
                pipeline = pipeline.with(middleware);
            }
        }
        pipeline
    }
}

#[cfg(test)]
pub(crate) fn reset_for_test() {
    set_global_pipeline(MiddlewarePipeline::new());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{context, ErrorContextExt};
    use crate::factory::{create_error, CreateErrorOptions};

    fn reset() {
        crate::config::reset_for_test();
        crate::pool::reset_for_test();
        crate::intern::reset_for_test();
        reset_for_test();
    }

    #[test]
    fn empty_pipeline_is_identity() {
        reset();
        let error = create_error(CreateErrorOptions::new("boom"));
        let message = error.message().to_owned();
        let pipeline = MiddlewarePipeline::new();
        let result = pipeline.run(error);
        assert_eq!(result.message(), message);
    }

    #[test]
    fn enrich_context_middleware_merges_fields() {
        reset();
        let error = create_error(CreateErrorOptions::new("boom"));
        let pipeline =
            MiddlewarePipeline::new().with(enrich_context_middleware(|| context().with("request_id", "r1")));
        let result = pipeline.run(error);
        let ctx = result.context().expect("context should be set by the middleware");
        assert_eq!(ctx.get("request_id"), Some(&crate::context::ContextValue::Str("r1".into())));
    }

    #[test]
    fn middlewares_run_in_insertion_order() {
        reset();
        let order = Rc::new(RefCell::new(Vec::new()));
        let (o1, o2) = (order.clone(), order.clone());
        let pipeline = MiddlewarePipeline::new()
            .with(logging_middleware(move |_| o1.borrow_mut().push(1)))
            .with(logging_middleware(move |_| o2.borrow_mut().push(2)));
        let error = create_error(CreateErrorOptions::new("boom"));
        pipeline.run(error);
        assert_eq!(*order.borrow(), vec![1, 2]);
    }

    #[test]
    fn filter_middleware_skips_inner_when_predicate_false() {
        reset();
        let ran = Rc::new(std::cell::Cell::new(false));
        let ran_clone = ran.clone();
        let inner = transform_middleware(move |e| {
            ran_clone.set(true);
            e
        });
        let pipeline = MiddlewarePipeline::new().with(filter_middleware(|_| false, inner));
        let error = create_error(CreateErrorOptions::new("boom"));
        pipeline.run(error);
        assert!(!ran.get());
    }
}
