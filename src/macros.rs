//! Small ergonomic macros for building context and minimal errors inline.
//!
//! Mirrors `but212-error-rail`'s `context!` macro (a formatted string
//! wrapped for lazy evaluation), adapted to this crate's map-shaped
//! [`crate::ErrorContext`] instead of a single lazily-formatted string.

/// Builds an [`crate::ErrorContext`] from `key => value` pairs.
///
/// ```
/// use try_rail::ctx;
///
/// let context = ctx! { "user_id" => 42i64, "action" => "checkout" };
/// assert_eq!(context.len(), 2);
/// ```
#[macro_export]
macro_rules! ctx {
    ($($key:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut context = $crate::context::context();
        $(
            context = $crate::context::ErrorContextExt::with(context, $key, $value);
        )*
        context
    }};
}

/// Builds a one-entry [`crate::ErrorContext`] under [`crate::traits::NOTE_KEY`]
/// from a `format!`-style message, mirroring the teacher's `context!` macro.
///
/// ```
/// use try_rail::context;
///
/// let user_id = 42;
/// let note = context!("processing user {user_id}");
/// assert_eq!(note.len(), 1);
/// ```
#[macro_export]
macro_rules! context {
    ($($arg:tt)*) => {
        $crate::context::ErrorContextExt::with(
            $crate::context::context(),
            $crate::traits::NOTE_KEY,
            format!($($arg)*),
        )
    };
}

/// Shorthand for [`crate::create_error`] with just an error type and a
/// `format!`-style message, skipping the [`crate::CreateErrorOptions`]
/// builder for the common case.
///
/// ```
/// use try_rail::minimal_error;
/// use try_rail::taxonomy::tag;
///
/// let field = "email";
/// let error = minimal_error!(tag::VALIDATION_ERROR, "missing field: {field}");
/// assert_eq!(error.error_type(), tag::VALIDATION_ERROR);
/// ```
#[macro_export]
macro_rules! minimal_error {
    ($error_type:expr, $($arg:tt)*) => {
        $crate::create_error(
            $crate::CreateErrorOptions::new(format!($($arg)*)).error_type($error_type)
        )
    };
}

#[cfg(test)]
mod tests {
    fn reset() {
        crate::config::reset_for_test();
        crate::pool::reset_for_test();
        crate::intern::reset_for_test();
    }

    #[test]
    fn ctx_macro_builds_a_multi_key_context() {
        reset();
        let context = ctx! { "request_id" => "r1", "retries" => 3i64 };
        assert_eq!(context.get("request_id"), Some(&crate::context::ContextValue::Str("r1".into())));
        assert_eq!(context.get("retries"), Some(&crate::context::ContextValue::Int(3)));
    }

    #[test]
    fn context_macro_formats_lazily_into_note_key() {
        reset();
        let id = 7;
        let note = context!("user {id} failed");
        assert_eq!(
            note.get(crate::traits::NOTE_KEY),
            Some(&crate::context::ContextValue::Str("user 7 failed".into()))
        );
    }

    #[test]
    fn minimal_error_macro_sets_type_and_message() {
        reset();
        let field = "email";
        let error = minimal_error!(crate::taxonomy::tag::VALIDATION_ERROR, "missing field: {field}");
        assert_eq!(error.error_type(), crate::taxonomy::tag::VALIDATION_ERROR);
        assert_eq!(error.message(), "missing field: email");
    }
}
