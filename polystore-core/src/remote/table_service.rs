// polystore-core/src/remote/table_service.rs
//! Table-service adapter (PostgREST-style HTTP API).
//!
//! The remote service understands per-column equality filters and whole-row
//! insert/patch/delete, nothing else. Top-level conjunctive `Eq` predicates
//! are pushed down as `column=eq.value` query parameters to narrow the
//! transfer; the full predicate is then re-applied client-side with the
//! reference evaluator, trading extra transferred rows for correctness.
//!
//! Array mutations are read-modify-write: fetch the row, run the shared
//! update applier in memory, patch the whole row back keyed by its `id`
//! column. The window between read and patch is not atomic - two concurrent
//! appends to the same row can race and one can be lost. Collections that
//! need strict array-mutation atomicity belong on another backend.
//!
//! Any transport failure or non-2xx response surfaces as
//! `BackendUnavailable`; a failed read is never disguised as an empty result.

use parking_lot::RwLock;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;

use crate::backend::{Backend, DeleteResult, InsertResult, MutateResult};
use crate::document::Document;
use crate::error::{Result, StoreError};
use crate::find_options::{apply_skip_limit, apply_sort, FindOptions};
use crate::query::{eval, Comparison, Predicate};
use crate::update::{UpdateOp, UpdateSpec};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend bound to one table-service endpoint.
pub struct TableServiceBackend {
    client: Client,
    base_url: String,
    api_key: String,
    /// Unique columns registered through `create_index`, per table. The
    /// service itself has no index API; enforcement is a client-side
    /// pre-check with the same race window as the row patches.
    unique_fields: RwLock<HashMap<String, Vec<String>>>,
}

impl TableServiceBackend {
    pub fn connect(endpoint: &str, api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::BackendUnavailable(e.to_string()))?;
        Ok(TableServiceBackend {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            unique_fields: RwLock::new(HashMap::new()),
        })
    }

    fn table_url(&self, collection: &str) -> String {
        format!("{}/{}", self.base_url, collection)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    /// Fetch the equality-narrowed candidate set and re-apply the full
    /// predicate client-side.
    fn fetch_matching(&self, collection: &str, predicate: &Predicate) -> Result<Vec<Document>> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(equality_params(predicate));

        let response = self
            .authorize(self.client.get(self.table_url(collection)))
            .query(&params)
            .send()
            .map_err(|e| {
                StoreError::BackendUnavailable(format!("fetch from '{}': {}", collection, e))
            })?;
        let response = check_status(response, collection, "fetch")?;

        let rows: Vec<Value> = response
            .json()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let document = Document::from_value(row)?;
            if eval::matches(&document, predicate) {
                documents.push(document);
            }
        }
        Ok(documents)
    }

    /// Client-side uniqueness pre-check over the given fields.
    fn ensure_unique(
        &self,
        collection: &str,
        candidate: &Document,
        fields: &[String],
        exclude_id: Option<&Value>,
    ) -> Result<()> {
        for field in fields {
            let value = match candidate.get(field) {
                Some(v) if !v.is_null() => v.clone(),
                _ => continue,
            };
            let taken = self
                .fetch_matching(collection, &Predicate::eq(field.clone(), value.clone()))?
                .iter()
                .any(|row| exclude_id.map_or(true, |id| row.id() != Some(id)));
            if taken {
                return Err(StoreError::DuplicateKey(format!(
                    "unique index on '{}' already holds {}",
                    field, value
                )));
            }
        }
        Ok(())
    }

    fn registered_unique_fields(&self, collection: &str) -> Vec<String> {
        self.unique_fields
            .read()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

impl Backend for TableServiceBackend {
    fn find_one(&self, collection: &str, predicate: &Predicate) -> Result<Option<Document>> {
        Ok(self.fetch_matching(collection, predicate)?.into_iter().next())
    }

    fn find(
        &self,
        collection: &str,
        predicate: &Predicate,
        options: &FindOptions,
    ) -> Result<Vec<Document>> {
        let mut results = self.fetch_matching(collection, predicate)?;
        if let Some((field, order)) = &options.sort {
            apply_sort(&mut results, field, *order);
        }
        Ok(apply_skip_limit(results, options.skip, options.limit))
    }

    fn insert_one(&self, collection: &str, document: Document) -> Result<InsertResult> {
        let unique = self.registered_unique_fields(collection);
        self.ensure_unique(collection, &document, &unique, None)?;

        let inserted_id = document.id().cloned().unwrap_or(Value::Null);
        let response = self
            .authorize(self.client.post(self.table_url(collection)))
            .header("Prefer", "return=minimal")
            .json(document.as_map())
            .send()
            .map_err(|e| {
                StoreError::BackendUnavailable(format!("insert into '{}': {}", collection, e))
            })?;
        check_status(response, collection, "insert")?;
        Ok(InsertResult { inserted_id })
    }

    fn update_one(
        &self,
        collection: &str,
        predicate: &Predicate,
        update: &UpdateSpec,
    ) -> Result<MutateResult> {
        let target = match self.fetch_matching(collection, predicate)?.into_iter().next() {
            Some(doc) => doc,
            None => {
                return Ok(MutateResult {
                    matched_count: 0,
                    modified_count: 0,
                })
            }
        };
        let row_id = row_id(&target, collection)?;

        let mut updated = target;
        let modified = update.apply(&mut updated)?;
        if !modified {
            return Ok(MutateResult {
                matched_count: 1,
                modified_count: 0,
            });
        }

        let unique: Vec<String> = self
            .registered_unique_fields(collection)
            .into_iter()
            .filter(|f| update.named_fields().contains(&f.as_str()))
            .collect();
        self.ensure_unique(collection, &updated, &unique, Some(&row_id))?;

        // Plain column overwrites patch only the named columns; array
        // mutations and nested paths ship the whole mutated row.
        let body: Value = if update.touches_arrays() || names_nested_paths(update) {
            updated.into_value()
        } else {
            Value::Object(set_fields_body(update))
        };

        let id_param = filter_param(&row_id).ok_or_else(|| {
            StoreError::InvalidDocument(format!(
                "row 'id' in '{}' must be a scalar to patch by",
                collection
            ))
        })?;
        let response = self
            .authorize(self.client.patch(self.table_url(collection)))
            .query(&[("id", id_param.as_str())])
            .header("Prefer", "return=minimal")
            .json(&body)
            .send()
            .map_err(|e| {
                StoreError::BackendUnavailable(format!("patch in '{}': {}", collection, e))
            })?;
        check_status(response, collection, "patch")?;

        Ok(MutateResult {
            matched_count: 1,
            modified_count: 1,
        })
    }

    fn delete_one(&self, collection: &str, predicate: &Predicate) -> Result<DeleteResult> {
        let target = match self.fetch_matching(collection, predicate)?.into_iter().next() {
            Some(doc) => doc,
            None => return Ok(DeleteResult { deleted_count: 0 }),
        };
        let row_id = row_id(&target, collection)?;
        let id_param = filter_param(&row_id).ok_or_else(|| {
            StoreError::InvalidDocument(format!(
                "row 'id' in '{}' must be a scalar to delete by",
                collection
            ))
        })?;

        let response = self
            .authorize(self.client.delete(self.table_url(collection)))
            .query(&[("id", id_param.as_str())])
            .send()
            .map_err(|e| {
                StoreError::BackendUnavailable(format!("delete from '{}': {}", collection, e))
            })?;
        check_status(response, collection, "delete")?;
        Ok(DeleteResult { deleted_count: 1 })
    }

    fn count_documents(&self, collection: &str, predicate: &Predicate) -> Result<u64> {
        Ok(self.fetch_matching(collection, predicate)?.len() as u64)
    }

    fn create_index(&self, collection: &str, field: &str, unique: bool) -> Result<()> {
        if unique {
            let mut registry = self.unique_fields.write();
            let fields = registry.entry(collection.to_string()).or_default();
            if !fields.iter().any(|f| f == field) {
                fields.push(field.to_string());
            }
        } else {
            // Non-unique indexes are a server-side concern.
            log::debug!(
                "ignoring non-unique index on '{}.{}': managed by the table service",
                collection,
                field
            );
        }
        Ok(())
    }
}

/// Collect `column=eq.value` parameters from the conjunctive spine of the
/// predicate. Anything under an `Or`, any non-`Eq` operator, any dotted
/// path, and any non-scalar operand stays client-side; pushed-down
/// parameters only ever narrow the candidate set.
pub(crate) fn equality_params(predicate: &Predicate) -> Vec<(String, String)> {
    let mut params = Vec::new();
    collect_equality(predicate, &mut params);
    params
}

fn collect_equality(predicate: &Predicate, params: &mut Vec<(String, String)>) {
    match predicate {
        Predicate::And(children) => {
            for child in children {
                collect_equality(child, params);
            }
        }
        Predicate::Field(fp) if fp.op == Comparison::Eq && !fp.field.contains('.') => {
            if let Some(rendered) = filter_param(&fp.operand) {
                params.push((fp.field.clone(), rendered));
            }
        }
        _ => {}
    }
}

/// Render a scalar as a filter parameter value (`eq.x`, or `is.null`).
fn filter_param(operand: &Value) -> Option<String> {
    match operand {
        Value::String(s) => Some(format!("eq.{}", s)),
        Value::Number(n) => Some(format!("eq.{}", n)),
        Value::Bool(b) => Some(format!("eq.{}", b)),
        Value::Null => Some("is.null".to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn row_id(document: &Document, collection: &str) -> Result<Value> {
    document
        .id()
        .filter(|v| !v.is_null())
        .cloned()
        .ok_or_else(|| {
            StoreError::InvalidDocument(format!(
                "matched row in '{}' has no 'id' column to address it by",
                collection
            ))
        })
}

/// Merge every plain `Set` into one patch body.
fn set_fields_body(update: &UpdateSpec) -> Map<String, Value> {
    let mut body = Map::new();
    for op in &update.ops {
        if let UpdateOp::Set(fields) = op {
            for (field, value) in fields {
                body.insert(field.clone(), value.clone());
            }
        }
    }
    body
}

/// Whether any `Set` writes through a dot path; flat tables cannot patch a
/// nested member, so those go through the whole-row path.
fn names_nested_paths(update: &UpdateSpec) -> bool {
    update.ops.iter().any(|op| match op {
        UpdateOp::Set(fields) => fields.keys().any(|k| k.contains('.')),
        _ => false,
    })
}

fn check_status(response: Response, collection: &str, action: &str) -> Result<Response> {
    let status = response.status();
    if status == StatusCode::CONFLICT {
        let body = response.text().unwrap_or_default();
        return Err(StoreError::DuplicateKey(body));
    }
    if !status.is_success() {
        return Err(StoreError::BackendUnavailable(format!(
            "{} on '{}' failed with status {}",
            action, collection, status
        )));
    }
    Ok(response)
}
