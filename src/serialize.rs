//! Round-trippable serialization and structural utilities over
//! [`ErrorRecord`] (`C15`, `§4.15`).
//!
//! The wire shape is `{"type","message","source","timestamp","stack"?,
//! "context"?,"cause"?}` (`§6`). A branded cause serializes recursively;
//! an opaque cause serializes as its string representation. The brand
//! itself is never serialized (`I6`) — `deserialize_error` reinstates it
//! by going back through [`ErrorRecord::new`], the only constructor.

use std::rc::Rc;

use crate::brand::{Cause, ErrorRecord};
use crate::context::ErrorContext;
use crate::events::{emit, EventKind, EventPayload};
use crate::lazy::Lazy;
use crate::taxonomy::SerializeError;

#[cfg(feature = "serde")]
use crate::context::{context_value_to_json, json_to_context_value};

/// Turns `error` into a `serde_json::Value` following the wire shape
/// described at module level, unless the active configuration's
/// `serializer` hook is set (`§4.7`: "User function turning error to a
/// plain mapping for transport"), in which case that mapping is used
/// instead. Emits `errorSerialized` either way.
#[cfg(feature = "serde")]
pub fn serialize_error(error: &ErrorRecord) -> serde_json::Value {
    let value = match crate::config::get_cached_config().serializer.clone() {
        Some(serializer) => {
            let mapping = serializer(error);
            serde_json::Value::Object(
                mapping.iter().map(|(k, v)| (k.clone(), context_value_to_json(v))).collect(),
            )
        }
        None => to_json(error),
    };
    emit(EventKind::Serialized, EventPayload::Serialized { record: error });
    value
}

#[cfg(feature = "serde")]
fn to_json(error: &ErrorRecord) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    map.insert("type".to_owned(), serde_json::Value::String(error.error_type().to_owned()));
    map.insert("message".to_owned(), serde_json::Value::String(error.message().to_owned()));
    map.insert("source".to_owned(), serde_json::Value::String(error.source().to_owned()));
    map.insert("timestamp".to_owned(), serde_json::Value::from(error.timestamp()));
    if let Some(stack) = error.stack() {
        map.insert("stack".to_owned(), serde_json::Value::String(stack.to_owned()));
    }
    if let Some(ctx) = error.context() {
        let obj: serde_json::Map<String, serde_json::Value> =
            ctx.iter().map(|(k, v)| (k.clone(), context_value_to_json(v))).collect();
        map.insert("context".to_owned(), serde_json::Value::Object(obj));
    }
    if let Some(cause) = error.cause() {
        map.insert("cause".to_owned(), cause_to_json(cause));
    }
    serde_json::Value::Object(map)
}

#[cfg(feature = "serde")]
fn cause_to_json(cause: &Cause) -> serde_json::Value {
    match cause {
        Cause::Record(record) => to_json(record),
        Cause::Opaque { repr, .. } => serde_json::Value::String(repr.clone()),
    }
}

/// Reconstructs an [`ErrorRecord`] from a `serde_json::Value` produced by
/// [`serialize_error`] (or a hand-built payload of the same shape).
///
/// Required fields: `type`, `message`, `source`, `timestamp`. Unknown
/// fields are ignored (`§6`). Returns [`SerializeError`] on malformed
/// input rather than panicking.
#[cfg(feature = "serde")]
pub fn deserialize_error(value: &serde_json::Value) -> Result<ErrorRecord, SerializeError> {
    let record = from_json(value)?;
    emit(EventKind::Serialized, EventPayload::Serialized { record: &record });
    Ok(record)
}

#[cfg(feature = "serde")]
fn from_json(value: &serde_json::Value) -> Result<ErrorRecord, SerializeError> {
    let obj = value
        .as_object()
        .ok_or_else(|| SerializeError::InvalidShape("expected a JSON object".to_owned()))?;

    let error_type = obj
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or(SerializeError::MissingField("type"))?;
    let message = obj
        .get("message")
        .and_then(serde_json::Value::as_str)
        .ok_or(SerializeError::MissingField("message"))?;
    let source = obj
        .get("source")
        .and_then(serde_json::Value::as_str)
        .ok_or(SerializeError::MissingField("source"))?;
    let timestamp = obj
        .get("timestamp")
        .and_then(serde_json::Value::as_i64)
        .ok_or(SerializeError::MissingField("timestamp"))?;

    let context: Option<ErrorContext> = match obj.get("context") {
        Some(serde_json::Value::Object(ctx_obj)) => {
            Some(ctx_obj.iter().map(|(k, v)| (k.clone(), json_to_context_value(v))).collect())
        }
        Some(_) => return Err(SerializeError::InvalidShape("`context` must be an object".to_owned())),
        None => None,
    };

    let cause = match obj.get("cause") {
        Some(value @ serde_json::Value::Object(_)) => {
            Some(Cause::Record(Box::new(from_json(value)?)))
        }
        Some(serde_json::Value::String(repr)) => Some(Cause::Opaque {
            type_name: "deserialized",
            repr: repr.clone(),
            value: Rc::new(repr.clone()) as Rc<dyn std::any::Any>,
        }),
        Some(_) => return Err(SerializeError::InvalidShape("`cause` must be an object or string".to_owned())),
        None => None,
    };

    let mut flags = crate::flags::ErrorFlags::empty();
    let mut record = ErrorRecord::new(
        crate::intern::intern(error_type),
        message.to_owned(),
        Lazy::ready(crate::intern::intern(source)),
        timestamp,
    );
    if let Some(stack) = obj.get("stack").and_then(serde_json::Value::as_str) {
        record.stack = Some(Lazy::ready(stack.to_owned()));
        flags = flags.set(crate::flags::ErrorFlags::HAS_STACK);
    }
    if let Some(context) = context {
        record.context = Some(Lazy::ready(context));
        flags = flags.set(crate::flags::ErrorFlags::HAS_CONTEXT);
    }
    if cause.is_some() {
        flags = flags.set(crate::flags::ErrorFlags::HAS_CAUSE);
    }
    record.cause = cause;
    record.flags = flags;
    Ok(record)
}

/// Optional field overrides applied by [`clone_error`].
#[derive(Default)]
pub struct CloneOverrides {
    pub error_type: Option<String>,
    pub message: Option<String>,
    pub context: Option<ErrorContext>,
}

/// Produces a structural copy of `error`, with the brand intact (it goes
/// back through [`ErrorRecord::new`], the only constructor), optionally
/// overriding `error_type`/`message`/`context`.
///
/// Cloning forces every lazy field on `error` (stack, context, source):
/// there is no way to copy a not-yet-computed thunk without running it.
pub fn clone_error(error: &ErrorRecord, overrides: Option<CloneOverrides>) -> ErrorRecord {
    let overrides = overrides.unwrap_or_default();
    let error_type = overrides.error_type.unwrap_or_else(|| error.error_type().to_owned());
    let message = overrides.message.unwrap_or_else(|| error.message().to_owned());
    let context = overrides.context.or_else(|| error.context().cloned());

    let mut cloned = ErrorRecord::new(
        crate::intern::intern(&error_type),
        message,
        Lazy::ready(crate::intern::intern(error.source())),
        error.timestamp(),
    );
    cloned.stack = error.stack().map(|s| Lazy::ready(s.to_owned()));
    cloned.context = context.map(Lazy::ready);
    cloned.cause = error.cause().map(clone_cause);
    cloned.error_code = error.error_code().map(Rc::from);
    cloned.flags = error.flags();
    cloned
}

fn clone_cause(cause: &Cause) -> Cause {
    match cause {
        Cause::Record(record) => Cause::Record(Box::new(clone_error(record, None))),
        Cause::Opaque { type_name, repr, value } => {
            Cause::Opaque { type_name, repr: repr.clone(), value: Rc::clone(value) }
        }
    }
}

/// Which named fields [`are_errors_equal`] should compare, when the
/// caller wants something other than the default set.
pub const EQUALITY_FIELDS: &[&str] =
    &["type", "message", "source", "errorCode", "context", "cause"];

/// Structural equality ignoring `timestamp` and `stack` by default
/// (`P8`). Pass `fields` to compare only a specific subset, by the names
/// in [`EQUALITY_FIELDS`] plus `"timestamp"`/`"stack"`.
pub fn are_errors_equal(a: &ErrorRecord, b: &ErrorRecord, fields: Option<&[&str]>) -> bool {
    let fields = fields.unwrap_or(EQUALITY_FIELDS);
    fields.iter().all(|field| field_equal(a, b, field))
}

fn field_equal(a: &ErrorRecord, b: &ErrorRecord, field: &str) -> bool {
    match field {
        "type" => a.error_type() == b.error_type(),
        "message" => a.message() == b.message(),
        "source" => a.source() == b.source(),
        "errorCode" => a.error_code() == b.error_code(),
        "context" => a.context() == b.context(),
        "cause" => causes_equal(a.cause(), b.cause()),
        "timestamp" => a.timestamp() == b.timestamp(),
        "stack" => a.stack() == b.stack(),
        _ => true,
    }
}

fn causes_equal(a: Option<&Cause>, b: Option<&Cause>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(Cause::Record(a)), Some(Cause::Record(b))) => are_errors_equal(a, b, None),
        (Some(Cause::Opaque { repr: ra, .. }), Some(Cause::Opaque { repr: rb, .. })) => ra == rb,
        _ => false,
    }
}

/// A change to one scalar field, `(before, after)`.
pub type FieldChange = (String, String);

/// A structural diff between two records' context maps: keys only in `a`
/// are `removed`, keys only in `b` are `added`, keys present in both with
/// different values are `changed`.
#[derive(Default, Debug)]
pub struct ContextDiff {
    pub added: Vec<(String, crate::context::ContextValue)>,
    pub removed: Vec<(String, crate::context::ContextValue)>,
    pub changed: Vec<(String, crate::context::ContextValue, crate::context::ContextValue)>,
}

/// Structural diff between two records (`§4.15`): scalar field changes
/// plus a key-level [`ContextDiff`].
#[derive(Default, Debug)]
pub struct ErrorDiff {
    pub error_type: Option<FieldChange>,
    pub message: Option<FieldChange>,
    pub source: Option<FieldChange>,
    pub error_code: Option<(Option<String>, Option<String>)>,
    pub context: ContextDiff,
}

impl ErrorDiff {
    /// `true` if nothing differs between the two records.
    pub fn is_empty(&self) -> bool {
        self.error_type.is_none()
            && self.message.is_none()
            && self.source.is_none()
            && self.error_code.is_none()
            && self.context.added.is_empty()
            && self.context.removed.is_empty()
            && self.context.changed.is_empty()
    }
}

/// Computes [`ErrorDiff`] between `a` and `b`. Ignores `timestamp` and
/// `stack`, same default scope as [`are_errors_equal`].
pub fn diff_errors(a: &ErrorRecord, b: &ErrorRecord) -> ErrorDiff {
    let mut diff = ErrorDiff::default();
    if a.error_type() != b.error_type() {
        diff.error_type = Some((a.error_type().to_owned(), b.error_type().to_owned()));
    }
    if a.message() != b.message() {
        diff.message = Some((a.message().to_owned(), b.message().to_owned()));
    }
    if a.source() != b.source() {
        diff.source = Some((a.source().to_owned(), b.source().to_owned()));
    }
    if a.error_code() != b.error_code() {
        diff.error_code =
            Some((a.error_code().map(str::to_owned), b.error_code().map(str::to_owned)));
    }

    let empty = ErrorContext::new();
    let ctx_a = a.context().unwrap_or(&empty);
    let ctx_b = b.context().unwrap_or(&empty);
    for (key, value) in ctx_a {
        match ctx_b.get(key) {
            None => diff.context.removed.push((key.clone(), value.clone())),
            Some(other) if other != value => {
                diff.context.changed.push((key.clone(), value.clone(), other.clone()))
            }
            Some(_) => {}
        }
    }
    for (key, value) in ctx_b {
        if !ctx_a.contains_key(key) {
            diff.context.added.push((key.clone(), value.clone()));
        }
    }
    diff
}

/// FNV-1a offset basis / prime, 64-bit variant.
const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

#[inline(always)]
fn hash_bytes(hash: &mut u64, bytes: &[u8]) {
    for &byte in bytes {
        *hash ^= byte as u64;
        *hash = hash.wrapping_mul(FNV_PRIME);
    }
}

/// Configuration builder for [`get_error_fingerprint`], mirroring the
/// inclusion-flag shape of `but212-error-rail`'s own
/// `ComposableError::fingerprint`/`FingerprintConfig`.
pub struct FingerprintOptions<'a> {
    error: &'a ErrorRecord,
    include_type: bool,
    include_error_code: bool,
    include_message: bool,
    include_context: bool,
    include_keys: Option<&'a [&'a str]>,
    exclude_keys: Option<&'a [&'a str]>,
}

impl<'a> FingerprintOptions<'a> {
    pub fn new(error: &'a ErrorRecord) -> Self {
        FingerprintOptions {
            error,
            include_type: true,
            include_error_code: true,
            include_message: true,
            include_context: false,
            include_keys: None,
            exclude_keys: None,
        }
    }

    /// Whether to include `error_type` in the fingerprint (default: true).
    #[must_use]
    pub fn include_type(mut self, include: bool) -> Self {
        self.include_type = include;
        self
    }

    /// Whether to include the error code in the fingerprint (default: true).
    #[must_use]
    pub fn include_error_code(mut self, include: bool) -> Self {
        self.include_error_code = include;
        self
    }

    /// Whether to include the message in the fingerprint (default: true).
    #[must_use]
    pub fn include_message(mut self, include: bool) -> Self {
        self.include_message = include;
        self
    }

    /// Whether to include context entries in the fingerprint (default: false).
    #[must_use]
    pub fn include_context(mut self, include: bool) -> Self {
        self.include_context = include;
        self
    }

    /// Fingerprints only these context keys.
    #[must_use]
    pub fn include_context_keys(mut self, keys: &'a [&'a str]) -> Self {
        self.include_context = true;
        self.include_keys = Some(keys);
        self
    }

    /// Excludes these context keys from the fingerprint.
    #[must_use]
    pub fn exclude_context_keys(mut self, keys: &'a [&'a str]) -> Self {
        self.include_context = true;
        self.exclude_keys = Some(keys);
        self
    }

    /// Computes the fingerprint.
    #[must_use]
    pub fn compute(&self) -> u64 {
        let mut hash = FNV_OFFSET;

        if self.include_type {
            hash_bytes(&mut hash, b"type:");
            hash_bytes(&mut hash, self.error.error_type().as_bytes());
        }
        if self.include_error_code {
            if let Some(code) = self.error.error_code() {
                hash_bytes(&mut hash, b"code:");
                hash_bytes(&mut hash, code.as_bytes());
            }
        }
        if self.include_message {
            hash_bytes(&mut hash, b"msg:");
            hash_bytes(&mut hash, self.error.message().as_bytes());
        }
        if self.include_context {
            if let Some(context) = self.error.context() {
                let mut entries: Vec<(&str, &crate::context::ContextValue)> = context
                    .iter()
                    .map(|(k, v)| (k.as_str(), v))
                    .filter(|(key, _)| {
                        let included = self.include_keys.map_or(true, |keys| keys.contains(key));
                        let excluded = self.exclude_keys.is_some_and(|keys| keys.contains(key));
                        included && !excluded
                    })
                    .collect();
                entries.sort_unstable_by_key(|(key, _)| *key);
                for (key, value) in entries {
                    hash_bytes(&mut hash, b"ctx:");
                    hash_bytes(&mut hash, key.as_bytes());
                    hash_bytes(&mut hash, b"=");
                    hash_bytes(&mut hash, value.to_string().as_bytes());
                }
            }
        }
        hash
    }

    /// Computes the fingerprint and formats it as a fixed-width hex string.
    #[must_use]
    pub fn compute_hex(&self) -> String {
        format!("{:016x}", self.compute())
    }
}

/// Stable hash of `error`'s `type`/`error_code`/`message` for
/// deduplication (`§4.15`). Use [`FingerprintOptions`] directly for
/// control over which fields are included.
pub fn get_error_fingerprint(error: &ErrorRecord) -> String {
    FingerprintOptions::new(error).compute_hex()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{context, ContextValue, ErrorContextExt};
    use crate::factory::{create_error, CreateErrorOptions};

    fn reset() {
        crate::config::reset_for_test();
        crate::pool::reset_for_test();
        crate::intern::reset_for_test();
    }

    #[test]
    fn clone_error_preserves_brand_and_fields() {
        reset();
        let error = create_error(
            CreateErrorOptions::new("boom").error_type("ValidationError").context(context().with("k", "v")),
        );
        let cloned = clone_error(&error, None);
        assert!(cloned.is_valid());
        assert_eq!(cloned.error_type(), "ValidationError");
        assert_eq!(cloned.message(), "boom");
        assert_eq!(cloned.context(), error.context());
    }

    #[test]
    fn clone_error_applies_overrides() {
        reset();
        let error = create_error(CreateErrorOptions::new("boom"));
        let cloned = clone_error(
            &error,
            Some(CloneOverrides { message: Some("rewritten".to_owned()), ..Default::default() }),
        );
        assert_eq!(cloned.message(), "rewritten");
    }

    #[test]
    fn are_errors_equal_ignores_timestamp_and_stack_by_default() {
        reset();
        let a = create_error(CreateErrorOptions::new("boom").error_type("ValidationError"));
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = create_error(CreateErrorOptions::new("boom").error_type("ValidationError"));
        assert_ne!(a.timestamp(), 0);
        assert!(are_errors_equal(&a, &b, None));
    }

    #[test]
    fn are_errors_equal_detects_message_difference() {
        reset();
        let a = create_error(CreateErrorOptions::new("boom"));
        let b = create_error(CreateErrorOptions::new("bang"));
        assert!(!are_errors_equal(&a, &b, None));
    }

    #[test]
    fn diff_errors_reports_context_key_changes() {
        reset();
        let a = create_error(
            CreateErrorOptions::new("boom").context(context().with("kept", "same").with("removed", "gone")),
        );
        let b = create_error(
            CreateErrorOptions::new("boom").context(context().with("kept", "same").with("added", "new")),
        );
        let diff = diff_errors(&a, &b);
        assert!(diff.message.is_none());
        assert_eq!(diff.context.removed, vec![("removed".to_owned(), ContextValue::Str("gone".into()))]);
        assert_eq!(diff.context.added, vec![("added".to_owned(), ContextValue::Str("new".into()))]);
        assert!(diff.context.changed.is_empty());
    }

    #[test]
    fn fingerprint_is_stable_across_equivalent_errors() {
        reset();
        let a = create_error(CreateErrorOptions::new("boom").error_type("ValidationError"));
        let b = create_error(CreateErrorOptions::new("boom").error_type("ValidationError"));
        assert_eq!(get_error_fingerprint(&a), get_error_fingerprint(&b));
    }

    #[test]
    fn fingerprint_changes_when_message_differs() {
        reset();
        let a = create_error(CreateErrorOptions::new("boom"));
        let b = create_error(CreateErrorOptions::new("bang"));
        assert_ne!(get_error_fingerprint(&a), get_error_fingerprint(&b));
    }

    #[test]
    fn fingerprint_can_fold_in_context_keys() {
        reset();
        let a = create_error(CreateErrorOptions::new("boom").context(context().with("tenant", "a")));
        let b = create_error(CreateErrorOptions::new("boom").context(context().with("tenant", "b")));
        let without_context = FingerprintOptions::new(&a).compute() == FingerprintOptions::new(&b).compute();
        let with_context = FingerprintOptions::new(&a).include_context(true).compute()
            == FingerprintOptions::new(&b).include_context(true).compute();
        assert!(without_context);
        assert!(!with_context);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serialize_then_deserialize_round_trips_under_are_errors_equal() {
        reset();
        let error = create_error(
            CreateErrorOptions::new("boom").error_type("ValidationError").context(context().with("k", "v")),
        );
        let json = serialize_error(&error);
        let restored = deserialize_error(&json).expect("well-formed payload should deserialize");
        assert!(are_errors_equal(&error, &restored, None));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserialize_error_rejects_missing_required_field() {
        let payload = serde_json::json!({ "type": "ValidationError", "message": "boom" });
        let result = deserialize_error(&payload);
        assert!(matches!(result, Err(SerializeError::MissingField("source"))));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serialize_error_delegates_to_configured_serializer() {
        use std::rc::Rc;
        reset();
        crate::config::configure(crate::config::ConfigOverlay {
            serializer: Some(Some(Rc::new(|error: &ErrorRecord| {
                context().with("customType", error.error_type())
            }))),
            ..Default::default()
        })
        .unwrap();
        let error = create_error(CreateErrorOptions::new("boom").error_type("ValidationError"));
        let json = serialize_error(&error);
        assert_eq!(json, serde_json::json!({ "customType": "ValidationError" }));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserialize_error_round_trips_a_branded_cause() {
        reset();
        let inner = create_error(CreateErrorOptions::new("inner boom"));
        let outer = create_error(CreateErrorOptions::new("outer boom").cause(Cause::Record(Box::new(inner))));
        let json = serialize_error(&outer);
        let restored = deserialize_error(&json).expect("well-formed payload should deserialize");
        match restored.cause() {
            Some(Cause::Record(record)) => assert_eq!(record.message(), "inner boom"),
            other => panic!("expected a branded cause, got {other:?}"),
        }
    }
}
