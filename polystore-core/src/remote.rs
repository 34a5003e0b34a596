// polystore-core/src/remote.rs
//! Network-backed implementations of the [`Backend`](crate::backend::Backend)
//! contract.
//!
//! Two adapters with opposite translation strategies: the document database
//! speaks a filter/update language rich enough to push every construct down,
//! while the table service only understands per-column equality and
//! whole-row patches, so everything else is evaluated client-side.

pub mod document_db;
pub mod table_service;
