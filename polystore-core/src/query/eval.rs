// polystore-core/src/query/eval.rs
//! Predicate evaluator.
//!
//! `matches` is total and side-effect-free: every (document, predicate) pair
//! yields a boolean. It is the reference semantics for the whole layer: the
//! in-memory backend calls it directly, and the table-service adapter
//! re-applies it over fetched candidate rows, so remote translation bugs
//! cannot change what a predicate means.

use lazy_static::lazy_static;
use lru::LruCache;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use crate::document::Document;
use crate::query::{Comparison, FieldPredicate, Predicate};
use crate::value_utils::compare_values;

lazy_static! {
    /// Cache of compiled case-insensitive patterns, keyed by pattern source.
    /// Bounded LRU so unbounded caller-supplied patterns cannot bloat memory.
    static ref REGEX_CACHE: Mutex<LruCache<String, Regex>> =
        Mutex::new(LruCache::new(NonZeroUsize::new(100).unwrap()));
}

/// Evaluate a predicate tree against a document.
///
/// An empty `And` is vacuously true (the "list all" predicate); an empty
/// `Or` is vacuously false.
pub fn matches(document: &Document, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::Field(fp) => field_matches(document, fp),
        Predicate::And(children) => children.iter().all(|c| matches(document, c)),
        Predicate::Or(children) => children.iter().any(|c| matches(document, c)),
    }
}

fn field_matches(document: &Document, fp: &FieldPredicate) -> bool {
    match fp.op {
        Comparison::Eq => eq_matches(document.get(&fp.field), &fp.operand),
        Comparison::Ne => !eq_matches(document.get(&fp.field), &fp.operand),
        Comparison::Gt => {
            order_matches(document.get(&fp.field), &fp.operand, |ord| {
                ord == Ordering::Greater
            })
        }
        Comparison::Gte => {
            order_matches(document.get(&fp.field), &fp.operand, |ord| {
                matches!(ord, Ordering::Greater | Ordering::Equal)
            })
        }
        Comparison::RegexCi => regex_ci_matches(document.get(&fp.field), &fp.operand),
        Comparison::InSet => membership_matches(document, &fp.field, &fp.operand),
        Comparison::NotInSet => !membership_matches(document, &fp.field, &fp.operand),
    }
}

/// Exact equality; a missing field equals only a null operand.
fn eq_matches(doc_value: Option<&Value>, operand: &Value) -> bool {
    match doc_value {
        None => operand.is_null(),
        Some(v) => v == operand,
    }
}

/// Ordering comparison; missing fields and cross-type pairs never match.
fn order_matches<F>(doc_value: Option<&Value>, operand: &Value, accept: F) -> bool
where
    F: Fn(Ordering) -> bool,
{
    match doc_value {
        None => false,
        Some(v) => compare_values(v, operand).map(accept).unwrap_or(false),
    }
}

/// Case-insensitive regex match; missing or non-string fields fail.
fn regex_ci_matches(doc_value: Option<&Value>, operand: &Value) -> bool {
    let pattern = match operand.as_str() {
        Some(p) => p,
        None => {
            log::warn!("regex predicate with non-string operand never matches");
            return false;
        }
    };
    let text = match doc_value.and_then(Value::as_str) {
        Some(t) => t,
        None => return false,
    };
    match cached_regex(pattern) {
        Some(regex) => regex.is_match(text),
        None => false,
    }
}

/// Membership against an array field, with dot-path fan-out.
///
/// A plain array field matches when it contains the operand; a fan-out path
/// ("entries.player_id") matches when any resolved leaf equals the operand.
/// Absent or non-array fields are an empty set: always false here, so the
/// complement operator is always true for them.
fn membership_matches(document: &Document, field: &str, operand: &Value) -> bool {
    document.collect(field).into_iter().any(|value| match value {
        Value::Array(arr) => arr.contains(operand),
        leaf if field.contains('.') => leaf == operand,
        _ => false,
    })
}

fn cached_regex(pattern: &str) -> Option<Regex> {
    let mut cache = REGEX_CACHE.lock().unwrap();
    if let Some(regex) = cache.get(pattern) {
        return Some(regex.clone());
    }
    drop(cache);

    match Regex::new(&format!("(?i){}", pattern)) {
        Ok(regex) => {
            REGEX_CACHE.lock().unwrap().put(pattern.to_string(), regex.clone());
            Some(regex)
        }
        Err(e) => {
            log::warn!("unmatched predicate: invalid regex pattern '{}': {}", pattern, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Predicate;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    fn player(id: &str, grad_class: &str, verified: bool) -> Document {
        doc(json!({
            "id": id,
            "grad_class": grad_class,
            "verified": verified,
            "school": "Westlake High",
            "positions": ["QB", "WR"],
        }))
    }

    #[test]
    fn test_empty_and_matches_everything() {
        assert!(matches(&player("p1", "2026", false), &Predicate::empty()));
        assert!(matches(&Document::new(), &Predicate::empty()));
    }

    #[test]
    fn test_empty_or_matches_nothing() {
        assert!(!matches(&player("p1", "2026", false), &Predicate::Or(vec![])));
    }

    #[test]
    fn test_eq_and_missing_field() {
        let d = player("p1", "2026", true);
        assert!(matches(&d, &Predicate::eq("verified", json!(true))));
        assert!(!matches(&d, &Predicate::eq("verified", json!(false))));
        // Missing field equals only null.
        assert!(matches(&d, &Predicate::eq("deleted_at", json!(null))));
        assert!(!matches(&d, &Predicate::eq("deleted_at", json!("x"))));
    }

    #[test]
    fn test_ne_missing_field_matches() {
        let d = player("p1", "2026", true);
        assert!(matches(&d, &Predicate::ne("deleted_at", json!("x"))));
        assert!(!matches(&d, &Predicate::ne("deleted_at", json!(null))));
        assert!(!matches(&d, &Predicate::ne("id", json!("p1"))));
    }

    #[test]
    fn test_ordering_operators() {
        let d = doc(json!({"expires_at": "2026-03-01T00:00:00Z", "score": 42}));
        assert!(matches(
            &d,
            &Predicate::gt("expires_at", json!("2026-01-01T00:00:00Z"))
        ));
        assert!(matches(&d, &Predicate::gte("score", json!(42))));
        assert!(!matches(&d, &Predicate::gt("score", json!(42))));
        // Cross-type and missing fields never match.
        assert!(!matches(&d, &Predicate::gt("score", json!("42"))));
        assert!(!matches(&d, &Predicate::gt("absent", json!(0))));
    }

    #[test]
    fn test_regex_ci() {
        let d = doc(json!({"school": "Westlake High"}));
        assert!(matches(&d, &Predicate::regex_ci("school", "westlake")));
        assert!(matches(&d, &Predicate::regex_ci("school", "^west.*high$")));
        assert!(!matches(&d, &Predicate::regex_ci("school", "eastlake")));
        // Missing and non-string fields fail.
        assert!(!matches(&d, &Predicate::regex_ci("city", "austin")));
        let n = doc(json!({"school": 42}));
        assert!(!matches(&n, &Predicate::regex_ci("school", "4")));
    }

    #[test]
    fn test_invalid_regex_never_matches() {
        let d = doc(json!({"school": "Westlake"}));
        assert!(!matches(&d, &Predicate::regex_ci("school", "([unclosed")));
    }

    #[test]
    fn test_in_set_on_array_field() {
        let d = player("p1", "2026", true);
        assert!(matches(&d, &Predicate::in_set("positions", json!("QB"))));
        assert!(!matches(&d, &Predicate::in_set("positions", json!("TE"))));
        // Absent or non-array fields are an empty set.
        assert!(!matches(&d, &Predicate::in_set("tags", json!("x"))));
        assert!(!matches(&d, &Predicate::in_set("school", json!("West"))));
    }

    #[test]
    fn test_not_in_set_complement() {
        let d = player("p1", "2026", true);
        assert!(matches(&d, &Predicate::not_in_set("positions", json!("TE"))));
        assert!(!matches(&d, &Predicate::not_in_set("positions", json!("QB"))));
        // Full complement for absent fields.
        assert!(matches(&d, &Predicate::not_in_set("tags", json!("x"))));
    }

    #[test]
    fn test_membership_with_fan_out_path() {
        let d = doc(json!({
            "id": "c1",
            "saved_players": [
                {"player_id": "x1", "notes": "fast"},
                {"player_id": "x2", "notes": "tall"}
            ]
        }));
        assert!(matches(
            &d,
            &Predicate::in_set("saved_players.player_id", json!("x2"))
        ));
        assert!(matches(
            &d,
            &Predicate::not_in_set("saved_players.player_id", json!("x9"))
        ));
        assert!(!matches(
            &d,
            &Predicate::not_in_set("saved_players.player_id", json!("x1"))
        ));
    }

    #[test]
    fn test_or_truth_table() {
        let p = Predicate::any([
            Predicate::eq("primary_position", json!("QB")),
            Predicate::eq("secondary_position", json!("QB")),
        ]);
        let only_first = doc(json!({"primary_position": "QB"}));
        let only_second = doc(json!({"secondary_position": "QB"}));
        let both = doc(json!({"primary_position": "QB", "secondary_position": "QB"}));
        let neither = doc(json!({"primary_position": "WR"}));
        assert!(matches(&only_first, &p));
        assert!(matches(&only_second, &p));
        assert!(matches(&both, &p));
        assert!(!matches(&neither, &p));
    }

    #[test]
    fn test_same_field_predicates_conjoin() {
        // Both bounds must hold; the second does not overwrite the first.
        let p = Predicate::all([
            Predicate::gte("grad_class", json!("2026")),
            Predicate::eq("grad_class", json!("2027")),
        ]);
        assert!(matches(&player("p1", "2027", true), &p));
        assert!(!matches(&player("p2", "2026", true), &p));
        assert!(!matches(&player("p3", "2028", true), &p));
    }

    #[test]
    fn test_nested_composites() {
        let p = Predicate::all([
            Predicate::any([
                Predicate::regex_ci("school", "westlake"),
                Predicate::regex_ci("school", "eastlake"),
            ]),
            Predicate::eq("verified", json!(true)),
        ]);
        assert!(matches(&player("p1", "2026", true), &p));
        assert!(!matches(&player("p2", "2026", false), &p));
    }
}
