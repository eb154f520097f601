//! Classifying arbitrary thrown/caught values into branded records (`C9`).

use std::any::Any;
use std::fmt::Debug;
use std::rc::Rc;

use crate::brand::{Cause, ErrorRecord};
use crate::context::ErrorContext;
use crate::events::{emit, EventKind, EventPayload};
use crate::factory::{create_error, CreateErrorOptions};
use crate::taxonomy::tag;

fn classify_and_extract(
    boxed: Box<dyn Any>,
    type_name: &'static str,
) -> (Cause, String, &'static str) {
    match boxed.downcast::<String>() {
        Ok(s) => {
            let message = (*s).clone();
            (Cause::Opaque { type_name, repr: message.clone(), value: Rc::from(s as Box<dyn Any>) }, message, tag::STRING_ERROR)
        }
        Err(boxed) => match boxed.downcast::<&'static str>() {
            Ok(s) => {
                let message = (*s).to_owned();
                (Cause::Opaque { type_name, repr: message.clone(), value: Rc::from(s as Box<dyn Any>) }, message, tag::STRING_ERROR)
            }
            Err(boxed) => match boxed.downcast::<std::io::Error>() {
                Ok(io_err) => {
                    let message = io_err.to_string();
                    (Cause::Opaque { type_name, repr: message.clone(), value: Rc::from(io_err as Box<dyn Any>) }, message, tag::STD_ERROR)
                }
                Err(boxed) => {
                    let message = format!("{type_name} cause");
                    (Cause::Opaque { type_name, repr: message.clone(), value: Rc::from(boxed) }, message, tag::UNKNOWN_ERROR)
                }
            },
        },
    }
}

/// Builds a branded error wrapping `cause` under `error_type`.
///
/// `message` is used verbatim if given; otherwise it is extracted from
/// `cause` (its `Display`/classification-derived text when `cause` is a
/// branded record, a string, or a recognized standard error type).
/// `cause` is retained by reference inside the returned record (`I5`).
/// Emits `errorWrapped`.
pub fn wrap<T: Any + Debug>(
    error_type: impl Into<String>,
    cause: T,
    message: Option<String>,
    context: Option<ErrorContext>,
) -> ErrorRecord {
    let type_name = std::any::type_name::<T>();
    let boxed: Box<dyn Any> = Box::new(cause);

    let (cause_value, derived_message) = match boxed.downcast::<ErrorRecord>() {
        Ok(record) => {
            let msg = record.message().to_owned();
            (Cause::Record(record), msg)
        }
        Err(boxed) => {
            let (cause_value, message, _tag) = classify_and_extract(boxed, type_name);
            (cause_value, message)
        }
    };

    let mut options = CreateErrorOptions::new(message.unwrap_or(derived_message))
        .error_type(error_type)
        .cause(cause_value);
    options.context = context;
    let record = create_error(options);
    emit(EventKind::Wrapped, EventPayload::Wrapped { record: &record });
    record
}

/// Classifies a caught panic payload (`Box<dyn Any + Send>`) the same way
/// [`from_thrown`] classifies any other caught value. Used by
/// [`crate::result_sync::try_sync`] and [`crate::result_async::try_async`],
/// which catch panics via `std::panic::catch_unwind` rather than receiving
/// an already-typed cause.
pub(crate) fn from_panic(payload: Box<dyn Any + Send>, context: Option<ErrorContext>) -> ErrorRecord {
    let boxed: Box<dyn Any> = payload;
    let (cause_value, message, error_type) = classify_and_extract(boxed, "panic");
    let mut options = CreateErrorOptions::new(message).error_type(error_type).cause(cause_value);
    options.context = context;
    let record = create_error(options);
    emit(EventKind::Wrapped, EventPayload::Wrapped { record: &record });
    record
}

/// Classifies `cause` by type and delegates to [`wrap`] with the inferred
/// `error_type` tag.
///
/// If `cause` is already a branded [`ErrorRecord`], it is returned unchanged
/// — no double wrap (`P4`).
pub fn from_thrown<T: Any + Debug>(cause: T, context: Option<ErrorContext>) -> ErrorRecord {
    let type_name = std::any::type_name::<T>();
    let boxed: Box<dyn Any> = Box::new(cause);

    match boxed.downcast::<ErrorRecord>() {
        Ok(record) => *record,
        Err(boxed) => {
            let (cause_value, message, error_type) = classify_and_extract(boxed, type_name);
            let mut options = CreateErrorOptions::new(message).error_type(error_type).cause(cause_value);
            options.context = context;
            let record = create_error(options);
            emit(EventKind::Wrapped, EventPayload::Wrapped { record: &record });
            record
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config, intern, pool};

    fn reset() {
        config::reset_for_test();
        pool::reset_for_test();
        intern::reset_for_test();
    }

    #[test]
    fn wrap_extracts_message_from_string_cause() {
        reset();
        let record = wrap("CustomError", "disk full".to_owned(), None, None);
        assert_eq!(record.error_type(), "CustomError");
        assert_eq!(record.message(), "disk full");
    }

    #[test]
    fn wrap_honors_explicit_message_override() {
        reset();
        let record = wrap("CustomError", "disk full".to_owned(), Some("overridden".into()), None);
        assert_eq!(record.message(), "overridden");
    }

    #[test]
    fn from_thrown_classifies_string_as_string_error() {
        reset();
        let record = from_thrown("boom".to_owned(), None);
        assert_eq!(record.error_type(), tag::STRING_ERROR);
        assert_eq!(record.message(), "boom");
    }

    #[test]
    fn from_thrown_is_idempotent_on_already_branded_records() {
        reset();
        let first = from_thrown("boom".to_owned(), None);
        let first_message = first.message().to_owned();
        let second = from_thrown(first, None);
        assert_eq!(second.message(), first_message);
    }

    #[test]
    fn from_thrown_falls_back_to_unknown_error() {
        reset();
        struct Weird;
        impl Debug for Weird {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "Weird")
            }
        }
        let record = from_thrown(Weird, None);
        assert_eq!(record.error_type(), tag::UNKNOWN_ERROR);
    }
}
