//! Async-flavored convenience re-exports: everything from [`crate::prelude`]
//! plus the `async-tokio`-gated combinators, cancellation, and futures
//! context helper.
//!
//! ```ignore
//! use try_rail::prelude_async::*;
//!
//! async fn fetch_user(id: u64) -> TryResult<User> {
//!     fetch_from_db(id).with_ctx(|| context().with("user_id", id as i64)).await
//! }
//! ```

pub use crate::prelude::*;

pub use crate::result_async::{
    try_all_async, try_any_async, try_any_sequential, try_async, try_await, with_progress,
    with_timeout, CancelToken, ContextFuture, FutureResultExt, TryAsyncOptions,
};
