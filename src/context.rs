//! Structured context values attached to an [`crate::ErrorRecord`].
//!
//! Context is modeled as `BTreeMap<String, ContextValue>` rather than a
//! dynamically typed "any string maps to anything" bag: [`ContextValue`] is
//! the closed set of shapes that can appear, which keeps every context
//! consumer exhaustive instead of doing ad-hoc `dyn Any` downcasts.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

#[cfg(feature = "serde")]
use serde::Serialize as _;

/// One value within an error's [`ErrorContext`] map.
#[derive(Clone)]
pub enum ContextValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ContextValue>),
    Map(BTreeMap<String, ContextValue>),
    /// An opaque, non-serializable payload (e.g. a handle or closure result).
    /// Carries a type name for debugging; serializes as `null`.
    Opaque(&'static str, Rc<dyn std::any::Any>),
}

#[cfg(feature = "serde")]
impl serde::Serialize for ContextValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ContextValue::Null => serializer.serialize_unit(),
            ContextValue::Bool(b) => serializer.serialize_bool(*b),
            ContextValue::Int(i) => serializer.serialize_i64(*i),
            ContextValue::Float(x) => serializer.serialize_f64(*x),
            ContextValue::Str(s) => serializer.serialize_str(s),
            ContextValue::List(items) => items.serialize(serializer),
            ContextValue::Map(map) => map.serialize(serializer),
            ContextValue::Opaque(_, _) => serializer.serialize_unit(),
        }
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for ContextValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(json_to_context_value(&value))
    }
}

/// Converts a `serde_json::Value` into a [`ContextValue`], used both by the
/// manual `Deserialize` impl and by [`crate::serialize::deserialize_error`].
#[cfg(feature = "serde")]
pub fn json_to_context_value(value: &serde_json::Value) -> ContextValue {
    match value {
        serde_json::Value::Null => ContextValue::Null,
        serde_json::Value::Bool(b) => ContextValue::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                ContextValue::Int(i)
            } else {
                ContextValue::Float(n.as_f64().unwrap_or_default())
            }
        }
        serde_json::Value::String(s) => ContextValue::Str(s.clone()),
        serde_json::Value::Array(items) => {
            ContextValue::List(items.iter().map(json_to_context_value).collect())
        }
        serde_json::Value::Object(map) => ContextValue::Map(
            map.iter().map(|(k, v)| (k.clone(), json_to_context_value(v))).collect(),
        ),
    }
}

/// Converts a [`ContextValue`] into a `serde_json::Value`, used by
/// [`crate::serialize::serialize_error`].
#[cfg(feature = "serde")]
pub fn context_value_to_json(value: &ContextValue) -> serde_json::Value {
    match value {
        ContextValue::Null | ContextValue::Opaque(_, _) => serde_json::Value::Null,
        ContextValue::Bool(b) => serde_json::Value::Bool(*b),
        ContextValue::Int(i) => serde_json::Value::from(*i),
        ContextValue::Float(x) => serde_json::Value::from(*x),
        ContextValue::Str(s) => serde_json::Value::String(s.clone()),
        ContextValue::List(items) => {
            serde_json::Value::Array(items.iter().map(context_value_to_json).collect())
        }
        ContextValue::Map(map) => serde_json::Value::Object(
            map.iter().map(|(k, v)| (k.clone(), context_value_to_json(v))).collect(),
        ),
    }
}

impl fmt::Debug for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Null => write!(f, "Null"),
            ContextValue::Bool(b) => write!(f, "Bool({b:?})"),
            ContextValue::Int(i) => write!(f, "Int({i:?})"),
            ContextValue::Float(x) => write!(f, "Float({x:?})"),
            ContextValue::Str(s) => write!(f, "Str({s:?})"),
            ContextValue::List(items) => write!(f, "List({items:?})"),
            ContextValue::Map(map) => write!(f, "Map({map:?})"),
            ContextValue::Opaque(ty, _) => write!(f, "Opaque({ty})"),
        }
    }
}

impl PartialEq for ContextValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ContextValue::Null, ContextValue::Null) => true,
            (ContextValue::Bool(a), ContextValue::Bool(b)) => a == b,
            (ContextValue::Int(a), ContextValue::Int(b)) => a == b,
            (ContextValue::Float(a), ContextValue::Float(b)) => a == b,
            (ContextValue::Str(a), ContextValue::Str(b)) => a == b,
            (ContextValue::List(a), ContextValue::List(b)) => a == b,
            (ContextValue::Map(a), ContextValue::Map(b)) => a == b,
            (ContextValue::Opaque(a, ra), ContextValue::Opaque(b, rb)) => {
                a == b && Rc::ptr_eq(ra, rb)
            }
            _ => false,
        }
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Null => write!(f, "null"),
            ContextValue::Bool(b) => write!(f, "{b}"),
            ContextValue::Int(i) => write!(f, "{i}"),
            ContextValue::Float(x) => write!(f, "{x}"),
            ContextValue::Str(s) => write!(f, "{s}"),
            ContextValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            ContextValue::Map(_) => write!(f, "{{..}}"),
            ContextValue::Opaque(ty, _) => write!(f, "<opaque:{ty}>"),
        }
    }
}

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        ContextValue::Str(s.to_owned())
    }
}
impl From<String> for ContextValue {
    fn from(s: String) -> Self {
        ContextValue::Str(s)
    }
}
impl From<bool> for ContextValue {
    fn from(b: bool) -> Self {
        ContextValue::Bool(b)
    }
}
impl From<i64> for ContextValue {
    fn from(i: i64) -> Self {
        ContextValue::Int(i)
    }
}
impl From<f64> for ContextValue {
    fn from(x: f64) -> Self {
        ContextValue::Float(x)
    }
}

/// Structured, string-keyed context attached to an error record.
pub type ErrorContext = BTreeMap<String, ContextValue>;

/// Builds a one-entry [`ErrorContext`]; chain `.with()` to add more.
pub fn context() -> ErrorContext {
    BTreeMap::new()
}

/// Extension trait giving `ErrorContext` a fluent builder method.
pub trait ErrorContextExt {
    /// Inserts `key` -> `value.into()` and returns `self` for chaining.
    fn with(self, key: impl Into<String>, value: impl Into<ContextValue>) -> Self;
}

impl ErrorContextExt for ErrorContext {
    fn with(mut self, key: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.insert(key.into(), value.into());
        self
    }
}

/// Deep-merges `overlay` onto `base`, returning a new map. Maps merge
/// recursively key by key; every other value shape in `overlay` replaces the
/// corresponding key in `base` outright. Mirrors the deep-merge semantics
/// used by [`crate::config::configure`].
pub fn merge_context(base: &ErrorContext, overlay: &ErrorContext) -> ErrorContext {
    let mut out = base.clone();
    for (key, value) in overlay {
        match (out.get(key), value) {
            (Some(ContextValue::Map(base_map)), ContextValue::Map(overlay_map)) => {
                out.insert(key.clone(), ContextValue::Map(merge_context(base_map, overlay_map)));
            }
            _ => {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_chains() {
        let ctx = context().with("user_id", 7i64).with("route", "/checkout");
        assert_eq!(ctx.get("user_id"), Some(&ContextValue::Int(7)));
        assert_eq!(ctx.get("route"), Some(&ContextValue::Str("/checkout".into())));
    }

    #[test]
    fn deep_merge_recurses_into_nested_maps() {
        let base = context().with("nested", ContextValue::Map(context().with("a", 1i64)));
        let overlay = context().with("nested", ContextValue::Map(context().with("b", 2i64)));
        let merged = merge_context(&base, &overlay);
        let ContextValue::Map(nested) = merged.get("nested").unwrap() else { panic!() };
        assert_eq!(nested.get("a"), Some(&ContextValue::Int(1)));
        assert_eq!(nested.get("b"), Some(&ContextValue::Int(2)));
    }

    #[test]
    fn non_map_overlay_replaces_outright() {
        let base = context().with("x", 1i64);
        let overlay = context().with("x", "now a string");
        let merged = merge_context(&base, &overlay);
        assert_eq!(merged.get("x"), Some(&ContextValue::Str("now a string".into())));
    }
}
