// polystore-core/src/find_options.rs
// Find query options: sort, skip, limit - plus the pure helpers that apply
// them to an in-memory result set.

use crate::document::Document;
use crate::value_utils::sort_compare;

/// Direction of a sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Options for find queries.
///
/// Skip is applied before limit. `count_documents` ignores both.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Sort by a single field; ties keep insertion order (stable sort).
    pub sort: Option<(String, SortOrder)>,

    /// Number of matching documents to skip (pagination).
    pub skip: Option<usize>,

    /// Maximum number of documents to return.
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some((field.into(), order));
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Stable sort by one field; documents missing the field sort first.
pub fn apply_sort(docs: &mut [Document], field: &str, order: SortOrder) {
    docs.sort_by(|a, b| {
        let cmp = sort_compare(a.get(field), b.get(field));
        match order {
            SortOrder::Ascending => cmp,
            SortOrder::Descending => cmp.reverse(),
        }
    });
}

/// Apply skip then limit to an already-ordered result set.
pub fn apply_skip_limit(
    docs: Vec<Document>,
    skip: Option<usize>,
    limit: Option<usize>,
) -> Vec<Document> {
    let skip = skip.unwrap_or(0);
    docs.into_iter()
        .skip(skip)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn docs(values: Vec<serde_json::Value>) -> Vec<Document> {
        values
            .into_iter()
            .map(|v| Document::from_value(v).unwrap())
            .collect()
    }

    fn ids(docs: &[Document]) -> Vec<String> {
        docs.iter()
            .map(|d| d.id().unwrap().as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_sort_ascending_descending() {
        let mut set = docs(vec![
            json!({"id": "b", "grad_class": "2027"}),
            json!({"id": "a", "grad_class": "2026"}),
            json!({"id": "c", "grad_class": "2028"}),
        ]);
        apply_sort(&mut set, "grad_class", SortOrder::Ascending);
        assert_eq!(ids(&set), vec!["a", "b", "c"]);
        apply_sort(&mut set, "grad_class", SortOrder::Descending);
        assert_eq!(ids(&set), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_sort_is_stable_on_ties() {
        let mut set = docs(vec![
            json!({"id": "first", "grad_class": "2026"}),
            json!({"id": "second", "grad_class": "2026"}),
            json!({"id": "third", "grad_class": "2026"}),
        ]);
        apply_sort(&mut set, "grad_class", SortOrder::Ascending);
        assert_eq!(ids(&set), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_missing_sort_field_sorts_first() {
        let mut set = docs(vec![
            json!({"id": "b", "rank": 2}),
            json!({"id": "a"}),
        ]);
        apply_sort(&mut set, "rank", SortOrder::Ascending);
        assert_eq!(ids(&set), vec!["a", "b"]);
    }

    #[test]
    fn test_skip_then_limit() {
        let set = docs(vec![
            json!({"id": "a"}),
            json!({"id": "b"}),
            json!({"id": "c"}),
            json!({"id": "d"}),
        ]);
        let page = apply_skip_limit(set, Some(1), Some(2));
        assert_eq!(ids(&page), vec!["b", "c"]);
    }

    #[test]
    fn test_skip_past_end_yields_empty() {
        let set = docs(vec![json!({"id": "a"})]);
        assert!(apply_skip_limit(set, Some(5), None).is_empty());
    }
}
