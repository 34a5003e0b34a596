// polystore-core/src/backend.rs
//! The contract every storage backend implements.
//!
//! Callers never hold a concrete backend; they hold a
//! [`CollectionHandle`](crate::registry::CollectionHandle) that delegates
//! here. All implementations must be observationally equivalent to the
//! in-memory backend for the same predicates and updates; where one cannot be
//! (the table service's non-atomic array mutations), the divergence is
//! documented on the adapter, not silently absorbed.

use serde_json::Value;

use crate::document::Document;
use crate::error::Result;
use crate::find_options::FindOptions;
use crate::query::Predicate;
use crate::update::UpdateSpec;

/// Outcome of an insert.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertResult {
    /// The application-populated `id` of the inserted document, or null when
    /// the caller inserted without one. The store never generates ids.
    pub inserted_id: Value,
}

/// Outcome of an update. Zero matches is a normal result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

/// Outcome of a delete. Zero deletions is a normal result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// A finite, consuming cursor over find results.
///
/// Non-restartable by design: once drained (or dropped mid-stream) it cannot
/// be rewound. Dropping it early has no effect on the underlying store.
#[derive(Debug)]
pub struct FindCursor {
    inner: std::vec::IntoIter<Document>,
}

impl FindCursor {
    pub(crate) fn new(documents: Vec<Document>) -> Self {
        FindCursor {
            inner: documents.into_iter(),
        }
    }

    /// Documents not yet consumed.
    pub fn remaining(&self) -> usize {
        self.inner.len()
    }
}

impl Iterator for FindCursor {
    type Item = Document;

    fn next(&mut self) -> Option<Document> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Storage backend contract.
///
/// Implementations are safe for concurrent use; every method may be called
/// from many threads or tasks at once. Mutating calls abandoned by a caller
/// leave whatever state the partial operation produced - nothing is rolled
/// back by this layer.
pub trait Backend: Send + Sync {
    /// First document matching the predicate, in the backend's storage
    /// order. `Ok(None)` is the normal "not found" outcome.
    fn find_one(&self, collection: &str, predicate: &Predicate) -> Result<Option<Document>>;

    /// All documents matching the predicate, after sort, skip, and limit.
    fn find(
        &self,
        collection: &str,
        predicate: &Predicate,
        options: &FindOptions,
    ) -> Result<Vec<Document>>;

    /// Append a document. Fails with
    /// [`DuplicateKey`](crate::error::StoreError::DuplicateKey) when a unique
    /// index rejects it.
    fn insert_one(&self, collection: &str, document: Document) -> Result<InsertResult>;

    /// Apply the update to the first matching document.
    fn update_one(
        &self,
        collection: &str,
        predicate: &Predicate,
        update: &UpdateSpec,
    ) -> Result<MutateResult>;

    /// Remove the first matching document.
    fn delete_one(&self, collection: &str, predicate: &Predicate) -> Result<DeleteResult>;

    /// Count all matches, independent of any skip/limit a find would use.
    fn count_documents(&self, collection: &str, predicate: &Predicate) -> Result<u64>;

    /// Register an index on a field. With `unique`, subsequent inserts and
    /// updates violating the constraint fail; existing documents are not
    /// retroactively validated.
    fn create_index(&self, collection: &str, field: &str, unique: bool) -> Result<()>;
}
