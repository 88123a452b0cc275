//! Deterministic encoding for persisted event payloads.
//!
//! Key-value stores frequently hand numbers back as decimals, so an event
//! written as `{"id": 1}` may be read back as `{"id": 1.0}`. Every payload is
//! canonicalized before it is persisted or used to derive a record identity:
//! integral numbers are written as integers and everything else keeps its
//! decimal form. Object keys are emitted in sorted order.

use serde_json::{Number, Value};

/// Largest magnitude at which every integer is exactly representable as f64.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Returns the canonical form of a JSON document.
///
/// # Example
///
/// ```
/// use relay_core::canonical::canonicalize;
/// use serde_json::json;
///
/// assert_eq!(canonicalize(json!({"id": 1.0, "ratio": 0.5})), json!({"id": 1, "ratio": 0.5}));
/// ```
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Number(number) => Value::Number(canonical_number(number)),
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        Value::Object(map) => {
            // Sorted insertion keeps the output stable even if serde_json is
            // built with `preserve_order`.
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(
                entries.into_iter().map(|(key, value)| (key, canonicalize(value))).collect(),
            )
        },
        other => other,
    }
}

/// Serializes a document in canonical form.
///
/// The output is stable for equal documents regardless of how their numbers
/// were originally encoded, which makes it suitable for hashing.
pub fn to_canonical_string(value: &Value) -> String {
    canonicalize(value.clone()).to_string()
}

fn canonical_number(number: Number) -> Number {
    if number.is_i64() || number.is_u64() {
        return number;
    }

    match number.as_f64() {
        Some(float) if is_exact_integer(float) => {
            #[allow(clippy::cast_possible_truncation)]
            let integer = float as i64;
            Number::from(integer)
        },
        _ => number,
    }
}

fn is_exact_integer(float: f64) -> bool {
    float.is_finite() && float.fract() == 0.0 && float.abs() <= MAX_EXACT_INTEGER
}
