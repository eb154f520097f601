//! The error-type taxonomy used when classifying arbitrary thrown values
//! (`§7`), plus the library's own internal error types.

use std::fmt;

/// Canonical `error_type` tags, exactly the taxonomy of `spec.md §7`.
pub mod tag {
    // Operational.
    pub const VALIDATION_ERROR: &str = "ValidationError";
    pub const ENTITY_ERROR: &str = "EntityError";
    pub const AMOUNT_ERROR: &str = "AmountError";
    pub const EXTERNAL_ERROR: &str = "ExternalError";
    pub const NETWORK_ERROR: &str = "NetworkError";
    pub const TIMEOUT_ERROR: &str = "TimeoutError";
    pub const ABORTED: &str = "ABORTED";
    pub const CIRCUIT_BREAKER_OPEN: &str = "CircuitBreakerOpen";
    pub const RATE_LIMITED: &str = "RateLimited";
    pub const MAX_RETRIES_EXCEEDED: &str = "MaxRetriesExceeded";
    pub const MULTIPLE_ERRORS: &str = "MultipleErrors";

    // Classification, assigned by `from_thrown`'s built-in classifier.
    // Rust has no runtime `TypeError`/`RangeError`-style distinction the
    // way a dynamically typed host does; `TYPE_ERROR`/`REFERENCE_ERROR`/
    // `SYNTAX_ERROR`/`RANGE_ERROR`/`URI_ERROR`/`EVAL_ERROR` are kept as
    // named tags for a registrable custom classifier to assign, but the
    // built-in classifier only ever produces `STD_ERROR`/`STRING_ERROR`/
    // `UNKNOWN_ERROR` from what Rust's own type landscape can tell apart.
    pub const TYPE_ERROR: &str = "TypeError";
    pub const REFERENCE_ERROR: &str = "ReferenceError";
    pub const SYNTAX_ERROR: &str = "SyntaxError";
    pub const RANGE_ERROR: &str = "RangeError";
    pub const URI_ERROR: &str = "URIError";
    pub const EVAL_ERROR: &str = "EvalError";
    pub const STD_ERROR: &str = "Error";
    pub const STRING_ERROR: &str = "StringError";
    pub const UNKNOWN_ERROR: &str = "UnknownError";

    // Library-internal.
    pub const CONFIGURATION_ERROR: &str = "ConfigurationError";
    pub const UNKNOWN_PRESET: &str = "UnknownPreset";
    pub const SERIALIZATION_ERROR: &str = "SerializationError";
}

/// Errors raised by the configuration subsystem itself (`§4.7`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `configure`/`create_env_config` was given a preset name that isn't
    /// registered.
    UnknownPreset(String),
    /// A scope handle was used after its owning scope was torn down.
    StaleScope,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownPreset(name) => write!(f, "unknown configuration preset: {name}"),
            ConfigError::StaleScope => write!(f, "configuration scope is no longer active"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors raised by [`crate::serialize`] when a serialized payload can't be
/// turned back into a valid record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerializeError {
    MissingField(&'static str),
    InvalidShape(String),
}

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializeError::MissingField(field) => write!(f, "missing required field `{field}`"),
            SerializeError::InvalidShape(reason) => write!(f, "invalid error payload: {reason}"),
        }
    }
}

impl std::error::Error for SerializeError {}
