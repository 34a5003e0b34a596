// polystore-core/src/update.rs
//! Update model and its authoritative in-memory applier.
//!
//! [`UpdateSpec::apply`] is the single definition of what each mutation
//! means. The in-memory backend runs it directly; the table-service adapter
//! runs it against a fetched row before patching the row back, so array
//! semantics cannot drift between backends. The document-database adapter
//! translates each operation onto the server's native update operators
//! instead.

use serde_json::{Map, Value};

use crate::document::{type_name, Document};
use crate::error::{Result, StoreError};
use crate::query::Predicate;

/// Matcher for a single array element.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementMatch {
    /// The element equals this value exactly (scalar arrays).
    Equals(Value),
    /// An object element whose fields satisfy the predicate.
    Matches(Predicate),
}

impl ElementMatch {
    /// Whether an array element satisfies this matcher.
    pub fn matches_element(&self, element: &Value) -> bool {
        match self {
            ElementMatch::Equals(expected) => element == expected,
            ElementMatch::Matches(predicate) => match element {
                Value::Object(map) => {
                    predicate.matches(&Document::from_map(map.clone()))
                }
                _ => false,
            },
        }
    }
}

/// One mutation within an [`UpdateSpec`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Overwrite the named fields (dot paths allowed); all others untouched.
    Set(Map<String, Value>),
    /// Append a value to an array field, creating the array when absent.
    Push { field: String, value: Value },
    /// Remove every array element matching the matcher.
    Pull { field: String, matcher: ElementMatch },
    /// Overwrite subfields of the first array element matching the matcher,
    /// leaving every other element untouched.
    PositionalSet {
        field: String,
        matcher: ElementMatch,
        fields: Map<String, Value>,
    },
}

/// An ordered list of mutations applied to a single document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateSpec {
    pub ops: Vec<UpdateOp>,
}

impl UpdateSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a batch of fields.
    pub fn set_fields(mut self, fields: Map<String, Value>) -> Self {
        self.ops.push(UpdateOp::Set(fields));
        self
    }

    /// Overwrite a single field.
    pub fn set(self, field: impl Into<String>, value: Value) -> Self {
        let mut fields = Map::new();
        fields.insert(field.into(), value);
        self.set_fields(fields)
    }

    pub fn push(mut self, field: impl Into<String>, value: Value) -> Self {
        self.ops.push(UpdateOp::Push {
            field: field.into(),
            value,
        });
        self
    }

    pub fn pull(mut self, field: impl Into<String>, matcher: ElementMatch) -> Self {
        self.ops.push(UpdateOp::Pull {
            field: field.into(),
            matcher,
        });
        self
    }

    pub fn positional_set(
        mut self,
        field: impl Into<String>,
        matcher: ElementMatch,
        fields: Map<String, Value>,
    ) -> Self {
        self.ops.push(UpdateOp::PositionalSet {
            field: field.into(),
            matcher,
            fields,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Whether any operation mutates an array field. Adapters without native
    /// array operators route these through read-modify-write.
    pub fn touches_arrays(&self) -> bool {
        self.ops
            .iter()
            .any(|op| !matches!(op, UpdateOp::Set(_)))
    }

    /// Top-level field names this spec writes to.
    pub fn named_fields(&self) -> Vec<&str> {
        self.ops
            .iter()
            .flat_map(|op| -> Vec<&str> {
                match op {
                    UpdateOp::Set(fields) => fields
                        .keys()
                        .map(|k| k.split('.').next().unwrap_or(k))
                        .collect(),
                    UpdateOp::Push { field, .. }
                    | UpdateOp::Pull { field, .. }
                    | UpdateOp::PositionalSet { field, .. } => vec![field.as_str()],
                }
            })
            .collect()
    }

    /// Apply every operation in order. Returns whether the document changed.
    ///
    /// Fields not named by any operation are preserved untouched. Array
    /// operations on a present non-array field are an error and leave the
    /// document in whatever state earlier operations produced.
    pub fn apply(&self, document: &mut Document) -> Result<bool> {
        let mut modified = false;
        for op in &self.ops {
            match op {
                UpdateOp::Set(fields) => {
                    for (field, value) in fields {
                        if document.get(field) != Some(value) {
                            document.set_path(field, value.clone());
                            modified = true;
                        }
                    }
                }
                UpdateOp::Push { field, value } => {
                    let mut array = take_array(document, field, "append")?;
                    array.push(value.clone());
                    document.set_path(field, Value::Array(array));
                    modified = true;
                }
                UpdateOp::Pull { field, matcher } => {
                    if document.get(field).is_none() {
                        continue; // Nothing to remove.
                    }
                    let array = take_array(document, field, "remove from")?;
                    let kept: Vec<Value> = array
                        .iter()
                        .filter(|elem| !matcher.matches_element(elem))
                        .cloned()
                        .collect();
                    if kept.len() != array.len() {
                        document.set_path(field, Value::Array(kept));
                        modified = true;
                    }
                }
                UpdateOp::PositionalSet {
                    field,
                    matcher,
                    fields,
                } => {
                    let mut array = take_array(document, field, "position into")?;
                    let position = array
                        .iter()
                        .position(|elem| matcher.matches_element(elem));
                    let Some(index) = position else {
                        continue; // No matching element; no-op.
                    };
                    let element = &mut array[index];
                    if !element.is_object() {
                        return Err(StoreError::InvalidUpdate(format!(
                            "cannot set subfields of {} element in '{}'",
                            type_name(element),
                            field
                        )));
                    }
                    let mut changed = false;
                    if let Value::Object(map) = element {
                        for (sub, value) in fields {
                            if map.get(sub) != Some(value) {
                                map.insert(sub.clone(), value.clone());
                                changed = true;
                            }
                        }
                    }
                    if changed {
                        document.set_path(field, Value::Array(array));
                        modified = true;
                    }
                }
            }
        }
        Ok(modified)
    }
}

/// Clone out an array field, treating an absent field as empty.
fn take_array(document: &Document, field: &str, verb: &str) -> Result<Vec<Value>> {
    match document.get(field) {
        Some(Value::Array(arr)) => Ok(arr.clone()),
        Some(other) => Err(StoreError::InvalidUpdate(format!(
            "cannot {} '{}': field is {}, not an array",
            verb,
            field,
            type_name(other)
        ))),
        None => Ok(Vec::new()),
    }
}
