// polystore-core/src/lib.rs
// One query/update contract over three storage backends: an in-process
// store, a document database, and an HTTP table service. Application code
// talks to CollectionHandle and never learns which backend is active.

pub mod backend;
pub mod config;
pub mod document;
pub mod error;
pub mod find_options;
pub mod memory;
pub mod query;
pub mod registry;
pub mod remote;
pub mod update;
pub mod value_utils;

// Public exports
pub use backend::{Backend, DeleteResult, FindCursor, InsertResult, MutateResult};
pub use config::BackendConfig;
pub use document::Document;
pub use error::{Result, StoreError};
pub use find_options::{FindOptions, SortOrder};
pub use memory::MemoryBackend;
pub use query::{Comparison, FieldPredicate, Predicate};
pub use registry::{CollectionHandle, Registry};
pub use remote::document_db::DocumentDbBackend;
pub use remote::table_service::TableServiceBackend;
pub use update::{ElementMatch, UpdateOp, UpdateSpec};
