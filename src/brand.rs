//! The branded error record at the center of the crate.
//!
//! An [`ErrorRecord`] can only come from [`crate::create_error`],
//! [`crate::wrap`], or [`crate::from_thrown`] — every other path to
//! constructing one is crate-private. [`is_error`] is the only supported way
//! to ask "was this produced by the factory?", and it answers honestly even
//! for values that aren't an `ErrorRecord` at all.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::context::ErrorContext;
use crate::flags::ErrorFlags;
use crate::lazy::Lazy;

/// Module-private sentinel. Nothing outside this crate can construct one, so
/// nothing outside this crate can forge a `brand: Some(Brand)` field by hand.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Brand;

/// What a record points to as its cause, if anything.
///
/// Causes are held by reference (never deep-copied) so that wrapping a large
/// error chain stays cheap; see `I5` in the error-record invariants.
pub enum Cause {
    /// The cause was itself a branded record (recursive error chains).
    Record(Box<ErrorRecord>),
    /// The cause was some other thrown/caught value. `repr` is computed once,
    /// at classification time, since the boxed `Any` may not be `Display`.
    Opaque {
        type_name: &'static str,
        repr: String,
        #[allow(dead_code)]
        value: Rc<dyn core::any::Any>,
    },
}

impl fmt::Debug for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::Record(r) => f.debug_tuple("Record").field(r).finish(),
            Cause::Opaque { type_name, repr, .. } => {
                f.debug_struct("Opaque").field("type_name", type_name).field("repr", repr).finish()
            }
        }
    }
}

/// A branded, value-based error record.
///
/// Every field is readable without surprises (no hidden exceptions during a
/// getter), and the record never mutates once observed by calling code —
/// except for the private `pooled_in_use` marker used to detect
/// double-release when pooling is enabled.
pub struct ErrorRecord {
    pub(crate) brand: Option<Brand>,
    pub(crate) error_type: Rc<str>,
    pub(crate) message: String,
    pub(crate) source: Lazy<Rc<str>>,
    pub(crate) timestamp: i64,
    pub(crate) stack: Option<Lazy<String>>,
    pub(crate) context: Option<Lazy<ErrorContext>>,
    pub(crate) cause: Option<Cause>,
    pub(crate) error_code: Option<Rc<str>>,
    pub(crate) flags: ErrorFlags,
    pub(crate) pooled_in_use: Cell<bool>,
}

impl ErrorRecord {
    pub(crate) fn new(
        error_type: Rc<str>,
        message: String,
        source: Lazy<Rc<str>>,
        timestamp: i64,
    ) -> Self {
        ErrorRecord {
            brand: Some(Brand),
            error_type,
            message,
            source,
            timestamp,
            stack: None,
            context: None,
            cause: None,
            error_code: None,
            flags: ErrorFlags::empty(),
            pooled_in_use: Cell::new(false),
        }
    }

    /// `true` unless this record has been released back into the pool.
    pub fn is_valid(&self) -> bool {
        self.brand.is_some()
    }

    /// The error-type tag (e.g. `"ValidationError"`). Always present (`I1`).
    pub fn error_type(&self) -> &str {
        &self.error_type
    }

    /// The human-readable message. Always present, possibly empty (`I1`).
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Where the error originated, forcing lazy evaluation if needed.
    pub fn source(&self) -> &str {
        self.source.force()
    }

    /// Creation time, milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// The captured stack trace, if stack capture was enabled when this
    /// record was created. Forces lazy evaluation on first read.
    pub fn stack(&self) -> Option<&str> {
        self.stack.as_ref().map(|s| s.force().as_str())
    }

    /// Structured context attached at creation or via middleware, if any.
    /// Forces lazy evaluation on first read (`I6`).
    pub fn context(&self) -> Option<&ErrorContext> {
        self.context.as_ref().map(|c| c.force())
    }

    /// The machine-stable error code, if one was assigned.
    pub fn error_code(&self) -> Option<&str> {
        self.error_code.as_deref()
    }

    /// The causing record or value, if this record wraps one (`I5`).
    pub fn cause(&self) -> Option<&Cause> {
        self.cause.as_ref()
    }

    /// The metadata flags attached to this record (`C2`).
    pub fn flags(&self) -> ErrorFlags {
        self.flags
    }

    /// `true` if [`crate::lazy::is_lazy`] would report any field as unforced.
    pub fn has_unforced_fields(&self) -> bool {
        self.stack.as_ref().is_some_and(Lazy::is_pending)
            || self.context.as_ref().is_some_and(Lazy::is_pending)
            || self.source.is_pending()
    }

    /// Rebuilds this record with `extra` merged into its (forced) context,
    /// setting `HAS_CONTEXT`. Used by `enrichContextMiddleware`.
    pub(crate) fn with_merged_context(mut self, extra: ErrorContext) -> Self {
        let merged = match self.context.take() {
            Some(existing) => crate::context::merge_context(existing.force(), &extra),
            None => extra,
        };
        self.context = Some(Lazy::ready(merged));
        self.flags = self.flags.set(ErrorFlags::HAS_CONTEXT);
        self
    }

    /// Rebuilds this record with a machine-stable error code attached.
    pub(crate) fn with_error_code(mut self, code: Rc<str>) -> Self {
        self.error_code = Some(code);
        self
    }
}

impl fmt::Debug for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorRecord")
            .field("error_type", &self.error_type)
            .field("message", &self.message)
            .field("error_code", &self.error_code)
            .field("flags", &self.flags)
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = &self.error_code {
            write!(f, "[{}] {}: {}", code, self.error_type, self.message)
        } else {
            write!(f, "{}: {}", self.error_type, self.message)
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ErrorRecord {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            Some(Cause::Record(r)) => Some(r.as_ref()),
            _ => None,
        }
    }
}

/// Reports whether `value` is a live `ErrorRecord` produced by this crate's
/// factory. Returns `false` for any other type, and `false` for a record
/// that has been released back into the pool (`P2`).
///
/// This is the *only* supported way to check brand membership; there is no
/// public constructor for `ErrorRecord` that could be used to forge one.
pub fn is_error(value: &dyn core::any::Any) -> bool {
    match value.downcast_ref::<ErrorRecord>() {
        Some(record) => record.is_valid(),
        None => false,
    }
}
