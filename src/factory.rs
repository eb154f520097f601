//! `create_error`: the configuration-driven error record factory (`C8`).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::brand::{Cause, ErrorRecord};
use crate::config::{get_cached_config, Config};
use crate::context::ErrorContext;
use crate::events::{emit, EventKind, EventPayload};
use crate::flags::ErrorFlags;
use crate::lazy::Lazy;
use crate::source::{self, StackFormat};
use crate::{intern, pool};

const MAX_INTERN_LEN: usize = 128;

/// Inputs to [`create_error`]. Only `message` is required; everything else
/// falls back to config-driven defaults.
#[derive(Default)]
pub struct CreateErrorOptions {
    pub error_type: Option<String>,
    pub message: String,
    pub context: Option<ErrorContext>,
    pub cause: Option<Cause>,
    pub source: Option<String>,
    pub timestamp: Option<i64>,
    pub stack_offset: Option<usize>,
    pub capture_stack_trace: Option<bool>,
}

impl CreateErrorOptions {
    pub fn new(message: impl Into<String>) -> Self {
        CreateErrorOptions { message: message.into(), ..Default::default() }
    }

    pub fn error_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }

    pub fn context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn cause(mut self, cause: Cause) -> Self {
        self.cause = Some(cause);
        self
    }
}

fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn intern_if_short(value: &str) -> Rc<str> {
    if value.len() <= MAX_INTERN_LEN {
        intern::intern(value)
    } else {
        Rc::from(value)
    }
}

fn format_source(config: &Config, stack_offset: Option<usize>) -> String {
    let offset = stack_offset.unwrap_or(config.source_location.stack_offset);
    let raw = source::capture_frame(offset, StackFormat::Limited(1));
    if raw.is_empty() {
        return "unknown".to_owned();
    }
    if let Some(formatter) = &config.source_location.custom_formatter {
        if let Some((file, line, col)) = parse_file_line_col(&raw) {
            return formatter(file, line, col);
        }
    }
    if config.source_location.include_full_path {
        raw
    } else {
        raw.rsplit('/').next().unwrap_or(&raw).to_owned()
    }
}

/// Splits a `"...file:line:col"` frame into its parts, if it parses as one.
fn parse_file_line_col(frame: &str) -> Option<(&str, u32, u32)> {
    let mut parts = frame.rsplitn(3, ':');
    let col: u32 = parts.next()?.parse().ok()?;
    let line: u32 = parts.next()?.parse().ok()?;
    let file = parts.next()?;
    Some((file, line, col))
}

fn apply_context_budget(context: ErrorContext, max_size: usize) -> ErrorContext {
    // Cheap approximation of a byte budget: cap the number of top-level
    // entries rather than walk the whole value graph.
    if context.len() * 64 <= max_size {
        return context;
    }
    let keep = (max_size / 64).max(1);
    context.into_iter().take(keep).collect()
}

/// Builds a branded [`ErrorRecord`] honoring the active configuration's
/// optimization paths (minimal mode, pooling, interning, laziness),
/// following the ten-step algorithm of the component design (`§4.8`).
pub fn create_error(options: CreateErrorOptions) -> ErrorRecord {
    // Step 1: read derived config (O(1), version-keyed cache).
    let config = get_cached_config();
    create_error_with_config(&config, options)
}

/// The same ten-step algorithm as [`create_error`], but against an
/// explicitly supplied `config` rather than the global derived cache.
/// Used by [`crate::config::ConfigScope`] so that scoped factories shadow
/// the global configuration without mutating it (`§4.7`).
pub fn create_error_with_config(config: &Config, options: CreateErrorOptions) -> ErrorRecord {
    let error_type_str = options.error_type.clone().unwrap_or_else(|| config.default_error_type.clone());

    // Step 2: minimal mode short-circuits steps 3-9.
    if config.minimal_errors {
        let error_type = intern::intern(&error_type_str);
        let source = intern::intern("minimal");
        let mut record = ErrorRecord::new(error_type, options.message, Lazy::ready(source), 0);
        record.flags = ErrorFlags::empty().set(ErrorFlags::IS_MINIMAL);
        emit(EventKind::Created, EventPayload::Created { record: &record });
        return record;
    }

    // Step 3: determine source.
    let source_str = options
        .source
        .clone()
        .unwrap_or_else(|| {
            if config.include_source {
                format_source(config, options.stack_offset)
            } else {
                "disabled".to_owned()
            }
        });

    // Step 4: determine stack.
    let capture_stack = options.capture_stack_trace.unwrap_or(config.capture_stack_trace);
    let stack: Option<Lazy<String>> = if capture_stack {
        let backtrace = std::backtrace::Backtrace::force_capture();
        if config.performance.error_creation.lazy_stack_trace {
            Some(Lazy::pending(move || backtrace.to_string()))
        } else {
            Some(Lazy::ready(backtrace.to_string()))
        }
    } else {
        None
    };

    // Step 5: acquire from pool or allocate fresh.
    let use_pool = config.performance.error_creation.object_pooling;
    let mut record = if use_pool {
        match pool::try_acquire() {
            Some(mut record) => {
                record.message = options.message;
                record.source = Lazy::ready(intern_if_short(&source_str));
                record.timestamp = 0;
                record.stack = None;
                record.context = None;
                record.cause = None;
                record.error_code = None;
                record.flags = ErrorFlags::empty();
                record
            }
            None => {
                pool::record_created();
                ErrorRecord::new(Rc::from(""), options.message, Lazy::ready(intern_if_short(&source_str)), 0)
            }
        }
    } else {
        ErrorRecord::new(Rc::from(""), options.message, Lazy::ready(intern_if_short(&source_str)), 0)
    };
    record.stack = stack;
    record.cause = options.cause;

    // Step 6: context.
    let context: Option<Lazy<ErrorContext>> = if config.skip_context {
        None
    } else {
        options.context.map(|ctx| {
            let max_size = config.performance.context_capture.max_context_size;
            if config.performance.context_capture.deep_clone {
                Lazy::pending(move || apply_context_budget(ctx, max_size))
            } else {
                Lazy::ready(apply_context_budget(ctx, max_size))
            }
        })
    };
    record.context = context;

    // Step 7: intern type and (short) source.
    record.error_type = intern::intern(&error_type_str);

    // Step 8: compute flags and timestamp.
    let mut flags = ErrorFlags::empty();
    if record.stack.is_some() {
        flags = flags.set(ErrorFlags::HAS_STACK);
    }
    if record.context.is_some() {
        flags = flags.set(ErrorFlags::HAS_CONTEXT);
    }
    if record.cause.is_some() {
        flags = flags.set(ErrorFlags::HAS_CAUSE);
    }
    if !config.development_mode {
        flags = flags.set(ErrorFlags::IS_PRODUCTION);
    }
    if record.has_unforced_fields() {
        flags = flags.set(ErrorFlags::IS_LAZY);
    }
    if use_pool {
        flags = flags.set(ErrorFlags::IS_POOLED);
        record.pooled_in_use.set(true);
    }
    record.flags = flags;
    record.timestamp = if config.skip_timestamp { 0 } else { current_timestamp_millis() };

    // Step 9: on_error hook, then environment handler. Neither may panic
    // through the factory.
    record = run_on_error_hook(config, record);
    run_environment_handler(config, &record);

    // Step 10: emit errorCreated.
    emit(EventKind::Created, EventPayload::Created { record: &record });
    if use_pool {
        emit(EventKind::Pooled, EventPayload::Pooled { record: &record });
    }
    record
}

fn run_on_error_hook(config: &Config, record: ErrorRecord) -> ErrorRecord {
    let Some(hook) = &config.on_error else { return record };
    // Pass the hook a clone so the pre-hook record survives a panic intact;
    // the factory never throws, so a misbehaving hook must not corrupt the
    // caller's error in the process.
    let clone = crate::serialize::clone_error(&record, None);
    match catch_unwind(AssertUnwindSafe(|| hook(clone))) {
        Ok(replacement) => replacement,
        Err(_) => {
            #[cfg(feature = "tracing")]
            tracing::warn!("on_error hook panicked; keeping the pre-hook record");
            record
        }
    }
}

fn run_environment_handler(config: &Config, record: &ErrorRecord) {
    if !config.runtime_detection {
        return;
    }
    let kind = source::detect_runtime();
    let handler = match kind {
        source::RuntimeKind::Server => &config.environment_handlers.server,
        source::RuntimeKind::Client => &config.environment_handlers.client,
        source::RuntimeKind::Edge => &config.environment_handlers.edge,
    };
    if let Some(handler) = handler {
        // Side-effect only (logging, metrics); a panic here must not
        // propagate through the factory.
        if catch_unwind(AssertUnwindSafe(|| handler(record))).is_err() {
            #[cfg(feature = "tracing")]
            tracing::warn!("environment handler panicked; isolated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{self, ConfigOverlay, PerformanceOverlay, ErrorCreationOverlay};
    use crate::ErrorFlags as PublicFlags;

    fn reset() {
        config::reset_for_test();
        pool::reset_for_test();
        intern::reset_for_test();
    }

    #[test]
    fn minimal_mode_shape() {
        reset();
        config::configure("minimal").unwrap();
        let record = create_error(CreateErrorOptions::new("m").error_type("X"));
        assert_eq!(record.error_type(), "X");
        assert_eq!(record.message(), "m");
        assert_eq!(record.source(), "minimal");
        assert_eq!(record.timestamp(), 0);
        assert!(record.stack().is_none());
        assert!(record.context().is_none());
        assert!(record.cause().is_none());
    }

    #[test]
    fn default_mode_sets_has_stack_and_source() {
        reset();
        let record = create_error(CreateErrorOptions::new("boom"));
        assert!(record.is_valid());
        assert_ne!(record.timestamp(), 0);
    }

    #[test]
    fn pooled_records_are_flagged_and_reused() {
        reset();
        config::configure(ConfigOverlay {
            performance: Some(PerformanceOverlay {
                error_creation: Some(ErrorCreationOverlay {
                    object_pooling: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        })
        .unwrap();
        let record = create_error(CreateErrorOptions::new("first"));
        assert!(record.flags().has(PublicFlags::IS_POOLED));
        pool::release(record);
        let reused = create_error(CreateErrorOptions::new("second"));
        assert!(reused.is_valid());
    }

    #[test]
    fn panicking_on_error_hook_keeps_the_pre_hook_record() {
        reset();
        config::configure(ConfigOverlay {
            on_error: Some(Some(std::rc::Rc::new(|_record| panic!("hook blew up")))),
            ..Default::default()
        })
        .unwrap();
        // `create_error` must not unwind even though the hook does.
        let record = create_error(CreateErrorOptions::new("boom").error_type("ValidationError"));
        assert_eq!(record.error_type(), "ValidationError");
        assert_eq!(record.message(), "boom");
    }
}
