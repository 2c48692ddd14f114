//! Attribute maps and the loose equality used to compare them.
//!
//! Loose equality (`loose_eq`) is the relation the deduplicator and version
//! diffs use. It is symmetric and never stricter than JSON equality:
//!
//! | left        | right       | equal when                                   |
//! |-------------|-------------|----------------------------------------------|
//! | number      | number      | numerically equal (`1 == 1.0`)               |
//! | number      | string      | trimmed string parses to the same number     |
//! | string      | string      | identical, or both numeric and equal (`"1" == "1.0"`) |
//! | bool        | number      | `true` ⇔ non-zero                            |
//! | null        | string      | string is empty                              |
//! | array/object| same        | element-wise loose equality, same keys/length|
//!
//! Any other pairing of different JSON types is unequal.

use std::collections::BTreeMap;

use serde_json::{Number, Value};

/// A record's attributes: name to JSON value.
pub type Attributes = BTreeMap<String, Value>;

static NULL: Value = Value::Null;

/// Value of `field` in `attributes`, treating a missing attribute as null.
pub fn field<'a>(attributes: &'a Attributes, name: &str) -> &'a Value {
    attributes.get(name).unwrap_or(&NULL)
}

/// Loose (value) equality between two attribute values.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, Value::String(s)) | (Value::String(s), Value::Null) => s.is_empty(),
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Bool(x), Value::Number(n)) | (Value::Number(n), Value::Bool(x)) => {
            n.as_f64().is_some_and(|f| (f != 0.0) == *x)
        }
        (Value::Number(x), Value::Number(y)) => numbers_eq(x, y),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            match (parse_numeric(s), n.as_f64()) {
                (Some(parsed), Some(f)) => parsed == f,
                _ => false,
            }
        }
        (Value::String(x), Value::String(y)) => {
            x == y
                || matches!(
                    (parse_numeric(x), parse_numeric(y)),
                    (Some(l), Some(r)) if l == r
                )
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| loose_eq(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| loose_eq(v, other)))
        }
        _ => false,
    }
}

/// Exact comparison of JSON numbers across integer and float encodings.
pub(crate) fn numbers_eq(x: &Number, y: &Number) -> bool {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a == b;
    }
    match (x.as_f64(), y.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// A string that reads as a finite number.
fn parse_numeric(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
}
