// polystore-core/src/error.rs
// Error taxonomy for the storage abstraction.
//
// "Not found" is deliberately absent: find_one returns Ok(None) and
// zero-count mutations return zeroed result descriptors. Only conditions a
// caller cannot express as a value become errors.

use thiserror::Error;

/// Errors surfaced by every backend through the shared contract.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A unique-index constraint rejected an insert or update.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// The active backend could not be reached or answered with a failure.
    /// Read paths raise this instead of returning a fabricated empty result.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A predicate or update construct the active adapter cannot express,
    /// even with its client-side fallback.
    #[error("cannot translate for active backend: {0}")]
    TranslationUnsupported(String),

    /// Malformed predicate (e.g. a non-string regex operand).
    #[error("invalid predicate: {0}")]
    InvalidPredicate(String),

    /// Malformed update (e.g. an array operation on a non-array field).
    #[error("invalid update: {0}")]
    InvalidUpdate(String),

    /// A document that cannot be stored or addressed by the active backend.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Conversion to or from a backend's wire representation failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Startup configuration did not select a usable backend.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, StoreError>;
