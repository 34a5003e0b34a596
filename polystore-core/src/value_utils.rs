// polystore-core/src/value_utils.rs
// Ordering helpers shared by the predicate evaluator and result sorting.

use serde_json::Value;
use std::cmp::Ordering;

/// Compare two JSON values for predicate evaluation.
///
/// Only like-typed numbers, strings, and booleans are ordered; any other
/// pairing yields `None` and the comparison predicate fails to match.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(n1), Value::Number(n2)) => {
            let f1 = n1.as_f64()?;
            let f2 = n2.as_f64()?;
            f1.partial_cmp(&f2)
        }
        (Value::String(s1), Value::String(s2)) => Some(s1.cmp(s2)),
        (Value::Bool(b1), Value::Bool(b2)) => Some(b1.cmp(b2)),
        _ => None,
    }
}

/// Total order over optional values, used for sorting result sets.
///
/// Missing fields sort before everything; mixed types fall back to a fixed
/// type priority so a sort is always well-defined.
pub fn sort_compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(va), Some(vb)) => {
            compare_values(va, vb).unwrap_or_else(|| type_priority(va).cmp(&type_priority(vb)))
        }
    }
}

/// Type priority for mixed-type sorting: null < number < string < bool <
/// object < array.
fn type_priority(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Bool(_) => 3,
        Value::Object(_) => 4,
        Value::Array(_) => 5,
    }
}
