// polystore-core/src/query.rs
//! Predicate model shared by every backend.
//!
//! A predicate is a tree of field comparisons joined by `And`/`Or`
//! composites. The in-memory evaluator in [`eval`] defines the authoritative
//! semantics; remote adapters either translate a predicate into their wire
//! format or fetch a candidate superset and re-apply [`eval::matches`]
//! client-side.

pub mod eval;

use serde_json::Value;

use crate::document::Document;

/// Comparison operator of a single field predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Exact equality. A missing field equals only a null operand.
    Eq,
    /// Negation of `Eq`; a missing field is unequal to any non-null operand.
    Ne,
    /// Strictly greater than (numbers, strings, booleans).
    Gt,
    /// Greater than or equal.
    Gte,
    /// Case-insensitive regex match over string fields.
    RegexCi,
    /// Membership in an array field; absent or non-array fields never match.
    InSet,
    /// Complement of `InSet`; absent or non-array fields always match.
    NotInSet,
}

/// A single-field comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPredicate {
    pub field: String,
    pub op: Comparison,
    pub operand: Value,
}

/// A predicate tree.
///
/// `Predicate::empty()` (an `And` with no children) matches every document,
/// which is how "list all" queries are expressed. Two predicates on the same
/// field inside one `And` both have to hold; callers that intend
/// last-writer-wins must merge their constraints before building the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Field(FieldPredicate),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    /// The empty predicate; matches everything.
    pub fn empty() -> Self {
        Predicate::And(Vec::new())
    }

    /// A single-field comparison node.
    pub fn field(field: impl Into<String>, op: Comparison, operand: Value) -> Self {
        Predicate::Field(FieldPredicate {
            field: field.into(),
            op,
            operand,
        })
    }

    pub fn eq(field: impl Into<String>, operand: Value) -> Self {
        Self::field(field, Comparison::Eq, operand)
    }

    pub fn ne(field: impl Into<String>, operand: Value) -> Self {
        Self::field(field, Comparison::Ne, operand)
    }

    pub fn gt(field: impl Into<String>, operand: Value) -> Self {
        Self::field(field, Comparison::Gt, operand)
    }

    pub fn gte(field: impl Into<String>, operand: Value) -> Self {
        Self::field(field, Comparison::Gte, operand)
    }

    /// Case-insensitive pattern match; `pattern` is a regular expression.
    pub fn regex_ci(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::field(field, Comparison::RegexCi, Value::String(pattern.into()))
    }

    pub fn in_set(field: impl Into<String>, operand: Value) -> Self {
        Self::field(field, Comparison::InSet, operand)
    }

    pub fn not_in_set(field: impl Into<String>, operand: Value) -> Self {
        Self::field(field, Comparison::NotInSet, operand)
    }

    /// Conjunction of several predicates; empty input matches everything.
    pub fn all(children: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::And(children.into_iter().collect())
    }

    /// Disjunction of several predicates; empty input matches nothing.
    pub fn any(children: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::Or(children.into_iter().collect())
    }

    /// Conjoin another predicate onto this one.
    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut children) => {
                children.push(other);
                Predicate::And(children)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    /// Whether this is the empty (match-all) predicate.
    pub fn matches_all(&self) -> bool {
        matches!(self, Predicate::And(children) if children.is_empty())
    }

    /// Evaluate against a document. See [`eval::matches`].
    pub fn matches(&self, document: &Document) -> bool {
        eval::matches(document, self)
    }
}
