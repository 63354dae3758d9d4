//! Canonical serialization for cryptographic hashing.
//!
//! Maps a value from the canonical domain — null, bool, 53-bit-safe
//! integers, strings, arrays, string-keyed maps — to a single deterministic
//! UTF-8 byte string with no whitespace and keys sorted by Unicode
//! code-point order. Every record type in this crate builds a [`Value`],
//! canonicalizes it, and hashes the result; verifiers rebuild the same
//! [`Value`] from a record's content fields and recompute the hash.
//!
//! Floats are rejected unconditionally — there is no floating-point
//! variant in [`Value`] at all, so the rejection is enforced by the type
//! system rather than a runtime check.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Smallest/largest integer the codec will encode (spec §3, §4.1): outside
/// this range a value is not representable as a canonical integer.
pub const MIN_SAFE_INT: i64 = -(2i64.pow(53)) + 1;
/// See [`MIN_SAFE_INT`].
pub const MAX_SAFE_INT: i64 = 2i64.pow(53) - 1;

/// A value in the canonical domain.
///
/// Deliberately has no floating-point variant: the codec rejects floats by
/// construction rather than by a runtime check, per spec §4.1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `null`
    Null,
    /// `true` / `false`
    Bool(bool),
    /// A 53-bit-safe signed integer.
    Int(i64),
    /// An arbitrary Unicode string.
    Str(String),
    /// An ordered list; order is preserved on the wire.
    Array(Vec<Value>),
    /// A string-keyed map; keys are sorted by code-point order at encode
    /// time regardless of insertion order.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Build a map value from an ordered list of `(key, value)` pairs.
    /// Duplicate keys overwrite earlier ones, last write wins.
    pub fn map(pairs: impl IntoIterator<Item = (impl Into<String>, Value)>) -> Value {
        let mut m = BTreeMap::new();
        for (k, v) in pairs {
            m.insert(k.into(), v);
        }
        Value::Map(m)
    }

    /// Build an array value.
    pub fn array(items: impl IntoIterator<Item = Value>) -> Value {
        Value::Array(items.into_iter().collect())
    }

    /// Shorthand for an optional string: `None` becomes [`Value::Null`],
    /// matching spec §9's "present with null" rule — callers that want to
    /// *omit* a field entirely must leave it out of the map, not call this.
    pub fn opt_str(s: Option<impl Into<String>>) -> Value {
        match s {
            Some(s) => Value::Str(s.into()),
            None => Value::Null,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

fn escape_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn write_value(value: &Value, out: &mut String) -> Result<()> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Int(n) => {
            if *n < MIN_SAFE_INT || *n > MAX_SAFE_INT {
                return Err(Error::Canonical(format!(
                    "integer {n} outside safe range [{MIN_SAFE_INT}, {MAX_SAFE_INT}]"
                )));
            }
            out.push_str(&n.to_string());
        }
        Value::Str(s) => escape_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out)?;
            }
            out.push(']');
        }
        Value::Map(map) => {
            out.push('{');
            for (i, (k, v)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                escape_string(k, out);
                out.push(':');
                write_value(v, out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

/// Canonicalize `value` to its deterministic UTF-8 string form.
pub fn canonicalize(value: &Value) -> Result<String> {
    let mut out = String::new();
    write_value(value, &mut out)?;
    Ok(out)
}

/// Canonicalize `value` directly to bytes — the sole input to hashing and
/// signing anywhere in this protocol.
pub fn canonicalize_bytes(value: &Value) -> Result<Vec<u8>> {
    Ok(canonicalize(value)?.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_map_keys() {
        let v = Value::map([("b", Value::Int(1)), ("a", Value::Int(2))]);
        assert_eq!(canonicalize(&v).unwrap(), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn nested_example_from_spec() {
        // `{"b": 2, "a": [1, 2, 3]}` -> `{"a":[1,2,3],"b":2}`
        let v = Value::map([
            ("b", Value::Int(2)),
            ("a", Value::array([Value::Int(1), Value::Int(2), Value::Int(3)])),
        ]);
        assert_eq!(canonicalize(&v).unwrap(), r#"{"a":[1,2,3],"b":2}"#);
    }

    #[test]
    fn escapes_control_chars_and_keeps_utf8() {
        assert_eq!(canonicalize(&Value::Str("h\u{e9}llo".into())).unwrap(), "\"h\u{e9}llo\"");
        assert_eq!(canonicalize(&Value::Str("\n".into())).unwrap(), r#""\n""#);
        assert_eq!(canonicalize(&Value::Str("\u{1}".into())).unwrap(), "\"\\u0001\"");
    }

    #[test]
    fn rejects_out_of_range_integers() {
        assert!(canonicalize(&Value::Int(MAX_SAFE_INT + 1)).is_err());
        assert!(canonicalize(&Value::Int(MIN_SAFE_INT - 1)).is_err());
    }

    #[test]
    fn empty_array_and_no_whitespace() {
        let v = Value::array([]);
        assert_eq!(canonicalize(&v).unwrap(), "[]");
        let v = Value::map([("a", Value::Bool(true)), ("b", Value::Null)]);
        let s = canonicalize(&v).unwrap();
        assert!(!s.contains(' '));
    }

    #[test]
    fn duplicate_keys_last_write_wins() {
        let v = Value::map([("a", Value::Int(1)), ("a", Value::Int(2))]);
        assert_eq!(canonicalize(&v).unwrap(), r#"{"a":2}"#);
    }

    #[test]
    fn permutation_of_map_construction_is_order_independent() {
        let v1 = Value::map([("a", Value::Int(2)), ("b", Value::Int(1))]);
        let v2 = Value::map([("b", Value::Int(1)), ("a", Value::Int(2))]);
        assert_eq!(canonicalize(&v1).unwrap(), canonicalize(&v2).unwrap());
    }
}
