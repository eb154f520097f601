//! First-class cancellation token shared across async combinators (`§5`,
//! `§4.11`).
//!
//! Every other piece of shared state in this crate is thread-confined
//! (`Rc<RefCell<_>>`), but a [`CancelToken`] is handed into a
//! `tokio::spawn`ed task or raced against other futures, both of which may
//! move it across worker threads. It is the one place the crate reaches for
//! `Arc`/atomics instead of `Rc`/`Cell`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct CancelState {
    aborted: AtomicBool,
    notify: tokio::sync::Notify,
}

/// A cooperative cancellation signal (`§5`'s "AbortSignal-shaped" token).
///
/// Cloning a token shares the same underlying state: calling
/// [`CancelToken::abort`] on any clone is observed by every clone and by
/// every waiter on [`CancelToken::cancelled`].
#[derive(Clone)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken {
            state: Arc::new(CancelState { aborted: AtomicBool::new(false), notify: tokio::sync::Notify::new() }),
        }
    }

    /// `true` once [`Self::abort`] has been called on this token or any
    /// clone of it.
    pub fn is_aborted(&self) -> bool {
        self.state.aborted.load(Ordering::SeqCst)
    }

    /// Marks the token aborted and wakes every current and future waiter on
    /// [`Self::cancelled`]. Idempotent.
    pub fn abort(&self) {
        self.state.aborted.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    /// Resolves once [`Self::abort`] has been (or already was) called.
    /// Cooperative producers race this against their own work (`§4.11`:
    /// "external cancellation is observed cooperatively by `fn`").
    pub async fn cancelled(&self) {
        if self.is_aborted() {
            return;
        }
        let notified = self.state.notify.notified();
        tokio::pin!(notified);
        // Re-check after registering interest: `abort` between the check
        // above and the `notified()` registration must not be missed.
        if self.is_aborted() {
            return;
        }
        notified.await;
    }

    /// Derives a child token that is aborted when either `self` or the
    /// child itself is aborted. Used to compose an externally supplied
    /// signal with a call's own internal timeout token without giving the
    /// caller's signal the ability to be aborted by the timeout (`§4.11`:
    /// "the first to fire wins").
    pub fn linked_child(parents: &[CancelToken]) -> (CancelToken, LinkedGuard) {
        let child = CancelToken::new();
        let mut tasks = Vec::with_capacity(parents.len());
        for parent in parents {
            let parent = parent.clone();
            let child_handle = child.clone();
            tasks.push(tokio::spawn(async move {
                parent.cancelled().await;
                child_handle.abort();
            }));
        }
        (child, LinkedGuard { tasks })
    }
}

/// Aborts the background link tasks spawned by [`CancelToken::linked_child`]
/// once the combinator that created them has settled, so no dangling tasks
/// remain (`P9`: no leftover timers/listeners after settle).
pub struct LinkedGuard {
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Drop for LinkedGuard {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_resolves_immediately_if_already_aborted() {
        let token = CancelToken::new();
        token.abort();
        token.cancelled().await;
        assert!(token.is_aborted());
    }

    #[tokio::test]
    async fn clones_observe_the_same_abort() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_aborted());
        token.abort();
        assert!(clone.is_aborted());
    }

    #[tokio::test]
    async fn cancelled_wakes_once_aborted() {
        let token = CancelToken::new();
        let waiter_token = token.clone();
        let waiter = tokio::spawn(async move {
            waiter_token.cancelled().await;
        });
        tokio::task::yield_now().await;
        token.abort();
        waiter.await.expect("waiter task should not panic");
    }
}
