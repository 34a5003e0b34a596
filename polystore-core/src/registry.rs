// polystore-core/src/registry.rs
//! Collection registry and the handle callers actually use.
//!
//! Which backend serves the process is decided exactly once, when the
//! registry is built; every handle the registry hands out is bound to that
//! backend for the process lifetime. Handles are memoized per collection
//! name, so repeated lookups return the same binding instead of silently
//! minting new state.

use dashmap::DashMap;
use std::sync::Arc;

use crate::backend::{Backend, DeleteResult, FindCursor, InsertResult, MutateResult};
use crate::config::BackendConfig;
use crate::document::Document;
use crate::error::Result;
use crate::find_options::FindOptions;
use crate::memory::MemoryBackend;
use crate::query::Predicate;
use crate::remote::document_db::DocumentDbBackend;
use crate::remote::table_service::TableServiceBackend;
use crate::update::UpdateSpec;

/// Resolves logical collection names to backend-bound handles.
pub struct Registry {
    backend: Arc<dyn Backend>,
    handles: DashMap<String, CollectionHandle>,
}

impl Registry {
    /// Build the one backend this process will use.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let backend: Arc<dyn Backend> = match config {
            BackendConfig::InMemory => Arc::new(MemoryBackend::new()),
            BackendConfig::DocumentDb { uri, database } => {
                Arc::new(DocumentDbBackend::connect(uri, database)?)
            }
            BackendConfig::TableService { endpoint, api_key } => {
                Arc::new(TableServiceBackend::connect(endpoint, api_key)?)
            }
        };
        log::info!("storage registry initialized ({})", config.kind());
        Ok(Self::with_backend(backend))
    }

    /// Wrap an already-constructed backend. Lets tests run several
    /// registries over independent stores.
    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        Registry {
            backend,
            handles: DashMap::new(),
        }
    }

    /// Handle for a logical collection. Idempotent: the same name yields
    /// the same binding for the life of the registry.
    pub fn handle_for(&self, name: &str) -> CollectionHandle {
        if let Some(handle) = self.handles.get(name) {
            return handle.clone();
        }
        self.handles
            .entry(name.to_string())
            .or_insert_with(|| CollectionHandle {
                name: Arc::from(name),
                backend: Arc::clone(&self.backend),
            })
            .clone()
    }
}

/// A long-lived binding of one collection name to the active backend.
///
/// Stateless beyond that binding; cloning is cheap and clones share it.
/// Safe for concurrent use from many threads or tasks.
#[derive(Clone)]
pub struct CollectionHandle {
    name: Arc<str>,
    backend: Arc<dyn Backend>,
}

impl CollectionHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// First matching document, or `Ok(None)`.
    pub fn find_one(&self, predicate: &Predicate) -> Result<Option<Document>> {
        self.backend.find_one(&self.name, predicate)
    }

    /// Matching documents as a consuming cursor. Dropping the cursor early
    /// has no effect on the store.
    pub fn find(&self, predicate: &Predicate, options: &FindOptions) -> Result<FindCursor> {
        let documents = self.backend.find(&self.name, predicate, options)?;
        Ok(FindCursor::new(documents))
    }

    pub fn insert_one(&self, document: Document) -> Result<InsertResult> {
        self.backend.insert_one(&self.name, document)
    }

    pub fn update_one(&self, predicate: &Predicate, update: &UpdateSpec) -> Result<MutateResult> {
        self.backend.update_one(&self.name, predicate, update)
    }

    pub fn delete_one(&self, predicate: &Predicate) -> Result<DeleteResult> {
        self.backend.delete_one(&self.name, predicate)
    }

    /// Total matches, independent of any skip/limit.
    pub fn count_documents(&self, predicate: &Predicate) -> Result<u64> {
        self.backend.count_documents(&self.name, predicate)
    }

    pub fn create_index(&self, field: &str, unique: bool) -> Result<()> {
        self.backend.create_index(&self.name, field, unique)
    }
}
