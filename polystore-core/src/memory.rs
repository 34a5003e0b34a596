// polystore-core/src/memory.rs
//! In-memory backend: the reference implementation.
//!
//! One `RwLock`-guarded document list per collection; reads share the lock,
//! mutations hold it exclusively so a unique-index check and the write it
//! guards are atomic with respect to concurrent writers. Collections are
//! created lazily on first access. Data lives exactly as long as the
//! [`MemoryBackend`] value, so tests can construct independent stores.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::{Backend, DeleteResult, InsertResult, MutateResult};
use crate::document::Document;
use crate::error::{Result, StoreError};
use crate::find_options::{apply_skip_limit, apply_sort, FindOptions};
use crate::query::{eval, Predicate};
use crate::update::UpdateSpec;

#[derive(Debug, Clone)]
struct IndexSpec {
    field: String,
    unique: bool,
}

#[derive(Default)]
struct CollectionState {
    /// Documents in insertion order. Updates replace in place, so storage
    /// order reflects insertion, not mutation recency.
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

impl CollectionState {
    /// Check `candidate` against every unique index, ignoring the document
    /// at `skip` (the one being replaced). Null and absent values are exempt.
    fn unique_violation(&self, candidate: &Document, skip: Option<usize>) -> Option<String> {
        for index in self.indexes.iter().filter(|i| i.unique) {
            let value = match candidate.get(&index.field) {
                Some(v) if !v.is_null() => v,
                _ => continue,
            };
            let taken = self.documents.iter().enumerate().any(|(i, doc)| {
                Some(i) != skip && doc.get(&index.field) == Some(value)
            });
            if taken {
                return Some(format!(
                    "unique index on '{}' already holds {}",
                    index.field, value
                ));
            }
        }
        None
    }
}

/// Process-local store backing the in-memory backend.
pub struct MemoryBackend {
    collections: RwLock<HashMap<String, Arc<RwLock<CollectionState>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Collection state, created lazily on first access.
    fn collection(&self, name: &str) -> Arc<RwLock<CollectionState>> {
        if let Some(state) = self.collections.read().get(name) {
            return Arc::clone(state);
        }
        let mut collections = self.collections.write();
        Arc::clone(
            collections
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(CollectionState::default()))),
        )
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn find_one(&self, collection: &str, predicate: &Predicate) -> Result<Option<Document>> {
        let state = self.collection(collection);
        let state = state.read();
        Ok(state
            .documents
            .iter()
            .find(|doc| eval::matches(doc, predicate))
            .cloned())
    }

    fn find(
        &self,
        collection: &str,
        predicate: &Predicate,
        options: &FindOptions,
    ) -> Result<Vec<Document>> {
        let state = self.collection(collection);
        let mut results: Vec<Document> = {
            let state = state.read();
            state
                .documents
                .iter()
                .filter(|doc| eval::matches(doc, predicate))
                .cloned()
                .collect()
        };

        if let Some((field, order)) = &options.sort {
            apply_sort(&mut results, field, *order);
        }
        Ok(apply_skip_limit(results, options.skip, options.limit))
    }

    fn insert_one(&self, collection: &str, document: Document) -> Result<InsertResult> {
        let state = self.collection(collection);
        let mut state = state.write();

        if let Some(reason) = state.unique_violation(&document, None) {
            return Err(StoreError::DuplicateKey(reason));
        }

        let inserted_id = document.id().cloned().unwrap_or(Value::Null);
        state.documents.push(document);
        log::debug!("inserted into '{}' ({} total)", collection, state.documents.len());
        Ok(InsertResult { inserted_id })
    }

    fn update_one(
        &self,
        collection: &str,
        predicate: &Predicate,
        update: &UpdateSpec,
    ) -> Result<MutateResult> {
        let state = self.collection(collection);
        let mut state = state.write();

        let position = state
            .documents
            .iter()
            .position(|doc| eval::matches(doc, predicate));
        let Some(index) = position else {
            return Ok(MutateResult {
                matched_count: 0,
                modified_count: 0,
            });
        };

        let mut updated = state.documents[index].clone();
        let modified = update.apply(&mut updated)?;

        if modified {
            if let Some(reason) = state.unique_violation(&updated, Some(index)) {
                return Err(StoreError::DuplicateKey(reason));
            }
            state.documents[index] = updated;
        }

        Ok(MutateResult {
            matched_count: 1,
            modified_count: u64::from(modified),
        })
    }

    fn delete_one(&self, collection: &str, predicate: &Predicate) -> Result<DeleteResult> {
        let state = self.collection(collection);
        let mut state = state.write();

        let position = state
            .documents
            .iter()
            .position(|doc| eval::matches(doc, predicate));
        match position {
            Some(index) => {
                state.documents.remove(index);
                Ok(DeleteResult { deleted_count: 1 })
            }
            None => Ok(DeleteResult { deleted_count: 0 }),
        }
    }

    fn count_documents(&self, collection: &str, predicate: &Predicate) -> Result<u64> {
        let state = self.collection(collection);
        let state = state.read();
        Ok(state
            .documents
            .iter()
            .filter(|doc| eval::matches(doc, predicate))
            .count() as u64)
    }

    fn create_index(&self, collection: &str, field: &str, unique: bool) -> Result<()> {
        let state = self.collection(collection);
        let mut state = state.write();

        // Re-registering a field replaces its spec; existing documents are
        // not retroactively validated.
        if let Some(existing) = state.indexes.iter_mut().find(|i| i.field == field) {
            existing.unique = unique;
        } else {
            state.indexes.push(IndexSpec {
                field: field.to_string(),
                unique,
            });
        }
        log::debug!(
            "registered index on '{}.{}' (unique: {})",
            collection,
            field,
            unique
        );
        Ok(())
    }
}
