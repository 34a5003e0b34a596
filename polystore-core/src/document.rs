// polystore-core/src/document.rs
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

/// An ordered mapping from field name to JSON value.
///
/// Field names are case-sensitive and unique. Documents are identified by an
/// application-populated `id` field; the store never generates identifiers.
/// Timestamps are carried as RFC 3339 strings (see [`utc_now_value`]), which
/// order correctly under lexicographic comparison.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: Map<String, Value>,
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Document { fields: Map::new() }
    }

    /// Build a document from a JSON object value.
    ///
    /// Non-object values are rejected; a document is always a field mapping.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Document { fields }),
            other => Err(StoreError::InvalidDocument(format!(
                "expected a JSON object, got {}",
                type_name(&other)
            ))),
        }
    }

    /// Build a document directly from a field map.
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Document { fields }
    }

    /// Consume the document, yielding its JSON object value.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    /// The identifying `id` value, if the application populated one.
    pub fn id(&self) -> Option<&Value> {
        self.fields.get("id")
    }

    /// Field lookup with dot-path support.
    ///
    /// `"address.city"` resolves the `city` member of the nested `address`
    /// object; numeric segments index into arrays. Returns `None` when any
    /// segment is missing or not traversable.
    pub fn get(&self, field: &str) -> Option<&Value> {
        if field.is_empty() {
            return None;
        }
        if !field.contains('.') {
            return self.fields.get(field);
        }

        let mut parts = field.split('.');
        let mut value = self.fields.get(parts.next()?)?;
        for part in parts {
            match value {
                Value::Object(map) => value = map.get(part)?,
                Value::Array(arr) => {
                    let index: usize = part.parse().ok()?;
                    value = arr.get(index)?;
                }
                _ => return None,
            }
        }
        Some(value)
    }

    /// Resolve a dot path, fanning out over arrays.
    ///
    /// Where [`get`](Self::get) stops at an array unless the segment is a
    /// numeric index, this follows every element, so
    /// `"saved_players.player_id"` yields the `player_id` of each entry.
    /// Used by membership predicates.
    pub fn collect(&self, field: &str) -> Vec<&Value> {
        if field.is_empty() {
            return Vec::new();
        }

        let mut frontier: Vec<&Value> = Vec::new();
        let mut parts = field.split('.');
        match parts.next().and_then(|first| self.fields.get(first)) {
            Some(v) => frontier.push(v),
            None => return Vec::new(),
        }

        for part in parts {
            let mut next = Vec::new();
            for value in frontier {
                match value {
                    Value::Object(map) => {
                        if let Some(child) = map.get(part) {
                            next.push(child);
                        }
                    }
                    Value::Array(arr) => {
                        if let Ok(index) = part.parse::<usize>() {
                            if let Some(child) = arr.get(index) {
                                next.push(child);
                            }
                        } else {
                            for elem in arr {
                                if let Value::Object(map) = elem {
                                    if let Some(child) = map.get(part) {
                                        next.push(child);
                                    }
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            frontier = next;
        }
        frontier
    }

    /// Set a top-level field, replacing any previous value.
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    /// Set a field with dot-path support, creating intermediate objects.
    ///
    /// A numeric segment addresses an existing array slot; out-of-range
    /// indices are ignored rather than growing the array.
    pub fn set_path(&mut self, field: &str, value: Value) {
        if !field.contains('.') {
            self.fields.insert(field.to_string(), value);
            return;
        }

        let parts: Vec<&str> = field.split('.').collect();
        let first = parts[0];

        match self.fields.get_mut(first) {
            Some(root) => set_value_at_path(root, &parts[1..], value),
            None => {
                let nested = create_nested_value(&parts[1..], value);
                self.fields.insert(first.to_string(), nested);
            }
        }
    }

    /// Remove a top-level field, returning its previous value.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// Whether the document carries the top-level field.
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Number of top-level fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over top-level fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Borrow the underlying field map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.into_value()
    }
}

fn create_nested_value(parts: &[&str], value: Value) -> Value {
    if parts.is_empty() {
        return value;
    }
    let mut obj = Map::new();
    obj.insert(parts[0].to_string(), create_nested_value(&parts[1..], value));
    Value::Object(obj)
}

fn set_value_at_path(current: &mut Value, parts: &[&str], value: Value) {
    if parts.is_empty() {
        return;
    }

    if parts.len() == 1 {
        match current {
            Value::Object(map) => {
                map.insert(parts[0].to_string(), value);
            }
            Value::Array(arr) => {
                if let Ok(index) = parts[0].parse::<usize>() {
                    if index < arr.len() {
                        arr[index] = value;
                    }
                }
            }
            _ => {
                let mut obj = Map::new();
                obj.insert(parts[0].to_string(), value);
                *current = Value::Object(obj);
            }
        }
        return;
    }

    match current {
        Value::Object(map) => {
            if let Some(next) = map.get_mut(parts[0]) {
                set_value_at_path(next, &parts[1..], value);
            } else {
                map.insert(
                    parts[0].to_string(),
                    create_nested_value(&parts[1..], value),
                );
            }
        }
        Value::Array(arr) => {
            if let Ok(index) = parts[0].parse::<usize>() {
                if index < arr.len() {
                    set_value_at_path(&mut arr[index], &parts[1..], value);
                }
            }
        }
        _ => {
            *current = create_nested_value(parts, value);
        }
    }
}

/// Human-readable JSON type name for error messages.
pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Current UTC time as an RFC 3339 string value.
pub fn utc_now_value() -> Value {
    timestamp_value(&Utc::now())
}

/// A UTC timestamp as an RFC 3339 string value.
pub fn timestamp_value(instant: &DateTime<Utc>) -> Value {
    Value::String(instant.to_rfc3339_opts(SecondsFormat::Micros, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn player() -> Document {
        Document::from_value(json!({
            "id": "p1",
            "player_name": "Jordan Lake",
            "grad_class": "2026",
            "address": {"city": "Austin", "state": "TX"},
            "saved_players": [
                {"player_id": "x1", "notes": "fast"},
                {"player_id": "x2", "notes": "tall"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_from_value_rejects_non_object() {
        let err = Document::from_value(json!([1, 2, 3])).unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_get_top_level_and_nested() {
        let doc = player();
        assert_eq!(doc.get("player_name").unwrap(), &json!("Jordan Lake"));
        assert_eq!(doc.get("address.city").unwrap(), &json!("Austin"));
        assert_eq!(
            doc.get("saved_players.0.player_id").unwrap(),
            &json!("x1")
        );
        assert!(doc.get("address.zip").is_none());
        assert!(doc.get("").is_none());
    }

    #[test]
    fn test_collect_fans_out_over_arrays() {
        let doc = player();
        let ids: Vec<&Value> = doc.collect("saved_players.player_id");
        assert_eq!(ids, vec![&json!("x1"), &json!("x2")]);

        // Scalar paths behave like get().
        assert_eq!(doc.collect("grad_class"), vec![&json!("2026")]);
        assert!(doc.collect("missing.path").is_empty());
    }

    #[test]
    fn test_set_path_creates_intermediates() {
        let mut doc = Document::new();
        doc.set_path("stats.login_count", json!(1));
        assert_eq!(doc.get("stats.login_count").unwrap(), &json!(1));

        doc.set_path("stats.login_count", json!(2));
        assert_eq!(doc.get("stats.login_count").unwrap(), &json!(2));
    }

    #[test]
    fn test_set_path_into_array_slot() {
        let mut doc = player();
        doc.set_path("saved_players.1.notes", json!("left-handed"));
        assert_eq!(
            doc.get("saved_players.1.notes").unwrap(),
            &json!("left-handed")
        );
        // Sibling element untouched.
        assert_eq!(doc.get("saved_players.0.notes").unwrap(), &json!("fast"));
    }

    #[test]
    fn test_field_order_preserved() {
        let doc = Document::from_value(json!({"z": 1, "a": 2, "m": 3})).unwrap();
        let keys: Vec<&String> = doc.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_id_accessor() {
        let doc = player();
        assert_eq!(doc.id().unwrap(), &json!("p1"));
        assert!(Document::new().id().is_none());
    }

    #[test]
    fn test_roundtrip_through_value() {
        let doc = player();
        let restored = Document::from_value(doc.clone().into_value()).unwrap();
        assert_eq!(restored, doc);
    }

    #[test]
    fn test_timestamp_values_sort_lexicographically() {
        let earlier = timestamp_value(
            &"2026-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap(),
        );
        let later = timestamp_value(
            &"2026-06-15T12:30:00Z".parse::<DateTime<Utc>>().unwrap(),
        );
        assert!(earlier.as_str().unwrap() < later.as_str().unwrap());
    }
}
