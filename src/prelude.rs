//! Convenience re-exports for common usage patterns.
//!
//! ```
//! use try_rail::prelude::*;
//!
//! let result: TryResult<i32> = try_sync(|| "42".parse::<i32>());
//! assert!(is_ok(&result));
//! ```

// Macros.
pub use crate::{context, ctx, minimal_error};

// Core types.
pub use crate::brand::{is_error, ErrorRecord};
pub use crate::config::Config;
pub use crate::context::{ContextValue, ErrorContext};
pub use crate::factory::CreateErrorOptions;
pub use crate::middleware::{Middleware, MiddlewarePipeline};

// Traits.
pub use crate::traits::{IntoContext, IsTransient, ResultExt, TransientResultExt};

// Sync combinators, including the `TryResult<T>` alias and `create_error`.
pub use crate::create_error;
pub use crate::result_sync::*;
