//! `.ctx()` / `.with_ctx()` for futures that resolve to a [`TryResult`].
//!
//! Mirrors the sync story of attaching context via [`crate::context`]: the
//! context supplier only runs when the future actually resolves to an
//! error, so the success path pays nothing for it.

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use futures_core::future::FusedFuture;
use pin_project_lite::pin_project;

use crate::context::ErrorContext;
use crate::result_sync::TryResult;

pin_project! {
    /// Wraps a `Future<Output = TryResult<T>>`, merging context into the
    /// error branch only, the moment it resolves.
    #[must_use = "futures do nothing unless polled"]
    pub struct ContextFuture<Fut, F> {
        #[pin]
        future: Fut,
        context_fn: Option<F>,
    }
}

impl<Fut, F> ContextFuture<Fut, F> {
    pub(crate) fn new(future: Fut, context_fn: F) -> Self {
        ContextFuture { future, context_fn: Some(context_fn) }
    }
}

impl<Fut, F, T> Future for ContextFuture<Fut, F>
where
    Fut: Future<Output = TryResult<T>>,
    F: FnOnce() -> ErrorContext,
{
    type Output = TryResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match this.future.poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(value)) => Poll::Ready(Ok(value)),
            Poll::Ready(Err(error)) => {
                let context_fn = this.context_fn.take().expect("ContextFuture polled after completion");
                Poll::Ready(Err(error.with_merged_context(context_fn())))
            }
        }
    }
}

impl<Fut, F, T> FusedFuture for ContextFuture<Fut, F>
where
    Fut: FusedFuture<Output = TryResult<T>>,
    F: FnOnce() -> ErrorContext,
{
    fn is_terminated(&self) -> bool {
        self.context_fn.is_none() || self.future.is_terminated()
    }
}

/// Extension trait attaching error context to an async [`TryResult`].
pub trait FutureResultExt<T>: Future<Output = TryResult<T>> + Sized {
    /// Attaches `context` to the future's error, if any, evaluated lazily.
    fn with_ctx<F>(self, context_fn: F) -> ContextFuture<Self, F>
    where
        F: FnOnce() -> ErrorContext,
    {
        ContextFuture::new(self, context_fn)
    }
}

impl<Fut, T> FutureResultExt<T> for Fut where Fut: Future<Output = TryResult<T>> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{context, ErrorContextExt};
    use crate::factory::{create_error, CreateErrorOptions};

    fn reset() {
        crate::config::reset_for_test();
        crate::pool::reset_for_test();
        crate::intern::reset_for_test();
    }

    #[tokio::test]
    async fn success_path_never_calls_context_fn() {
        reset();
        let called = std::cell::Cell::new(false);
        let result: TryResult<i32> = async { Ok(7) }
            .with_ctx(|| {
                called.set(true);
                context()
            })
            .await;
        assert_eq!(result, Ok(7));
        assert!(!called.get());
    }

    #[tokio::test]
    async fn error_path_merges_context() {
        reset();
        let result: TryResult<i32> = async { Err(create_error(CreateErrorOptions::new("boom"))) }
            .with_ctx(|| context().with("request_id", "r1"))
            .await;
        let error = result.unwrap_err();
        let ctx = error.context().expect("context should be attached");
        assert_eq!(ctx.get("request_id"), Some(&crate::context::ContextValue::Str("r1".into())));
    }
}
