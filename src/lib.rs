//! Functional, value-based error handling.
//!
//! `try-rail` is built around three pillars:
//! 1. **A branded error record** ([`ErrorRecord`]) produced exclusively by
//!    [`create_error`]/[`wrap`]/[`from_thrown`], never by hand — forging one
//!    without going through the factory is not possible (see [`is_error`]).
//! 2. **A configurable factory** ([`factory`]) whose cost (stack capture,
//!    source extraction, context cloning, pooling, interning, laziness) is
//!    dictated entirely by the active [`Config`](config::Config).
//! 3. **Sync and async `Result` combinators** ([`result_sync`],
//!    [`result_async`]) layered with a middleware pipeline, a lifecycle
//!    event bus, and resilience wrappers (retry, rate limiting, circuit
//!    breaking) that all preserve `Result<T, ErrorRecord>` end-to-end.
//!
//! # Quick start
//!
//! ```
//! use try_rail::prelude::*;
//!
//! let result: Result<i32, ErrorRecord> = try_sync(|| "42".parse::<i32>());
//! assert!(result.is_ok());
//!
//! let failed: Result<i32, ErrorRecord> = try_sync(|| "nope".parse::<i32>());
//! assert!(is_err(&failed));
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Branded error record, the factory's only output type.
pub mod brand;
/// Compact bitset of per-record metadata flags.
pub mod flags;
/// Structured, string-keyed context values attached to a record.
pub mod context;
/// Bounded string intern table used to deduplicate `type`/`source` strings.
pub mod intern;
/// Fixed-capacity free list of reusable [`ErrorRecord`] instances.
pub mod pool;
/// On-demand ("lazy") materialization of deferred record fields.
pub mod lazy;
/// Stack-frame parsing and host runtime-class detection.
pub mod source;
/// The error-type taxonomy (`§7`) and library-internal error types.
pub mod taxonomy;
/// The configuration subsystem: presets, deep merge, versioned cache, scopes.
pub mod config;
/// `create_error`: the configuration-driven error record factory.
pub mod factory;
/// Classifying arbitrary thrown/caught values into branded records.
pub mod wrap;
/// Synchronous `Result` combinators.
pub mod result_sync;
/// Ordered, composable middleware pipeline over `Result` values.
pub mod middleware;
/// Lifecycle event bus (`errorCreated`, `errorPooled`, ...).
pub mod events;
/// `IntoContext`/`ResultExt`/`IsTransient` extension traits.
pub mod traits;
/// Retry policies, rate limiting, and circuit breaking for async execution.
pub mod resilience;
/// Round-trippable JSON(-like) serialization of error records.
pub mod serialize;
/// Small ergonomic macros for building context inline.
#[macro_use]
pub mod macros;
/// Commonly used re-exports.
pub mod prelude;

#[cfg(feature = "async-tokio")]
/// Asynchronous `Result` combinators (timeout, cancellation, fan-out/fan-in).
pub mod result_async;

#[cfg(feature = "async-tokio")]
/// Async-flavored convenience re-exports.
pub mod prelude_async;

pub use brand::{is_error, ErrorRecord};
pub use config::{configure, create_env_config, create_scope, get_config, get_config_version,
    reset_config, Config};
pub use context::{ContextValue, ErrorContext};
pub use events::events;
pub use factory::{create_error, CreateErrorOptions};
pub use flags::ErrorFlags;
pub use result_sync::*;
pub use wrap::{from_thrown, wrap};
