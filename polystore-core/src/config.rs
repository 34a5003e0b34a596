// polystore-core/src/config.rs
// Startup configuration: exactly one active backend per process.

use std::env;

use crate::error::{Result, StoreError};

/// Selection of the physical backend serving all collections.
///
/// Chosen once at process startup and never re-evaluated; the registry
/// holds the decision immutably afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// Process-local store; dies with the process. For tests and demos.
    InMemory,
    /// Document database reachable over its native wire protocol.
    DocumentDb { uri: String, database: String },
    /// Relational table service reachable over HTTP.
    TableService { endpoint: String, api_key: String },
}

impl BackendConfig {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::InMemory => "in-memory",
            BackendConfig::DocumentDb { .. } => "document-db",
            BackendConfig::TableService { .. } => "table-service",
        }
    }

    /// Read the backend selection from the environment.
    ///
    /// `POLYSTORE_BACKEND` picks the variant (`memory`, `mongodb`, `table`);
    /// unset defaults to the in-memory store. The remote variants read their
    /// connection parameters from `POLYSTORE_MONGO_URL` /
    /// `POLYSTORE_MONGO_DB` and `POLYSTORE_TABLE_URL` /
    /// `POLYSTORE_TABLE_KEY`.
    pub fn from_env() -> Result<Self> {
        let selected = env::var("POLYSTORE_BACKEND").unwrap_or_else(|_| "memory".to_string());
        match selected.as_str() {
            "memory" => Ok(BackendConfig::InMemory),
            "mongodb" => Ok(BackendConfig::DocumentDb {
                uri: require_env("POLYSTORE_MONGO_URL")?,
                database: require_env("POLYSTORE_MONGO_DB")?,
            }),
            "table" => Ok(BackendConfig::TableService {
                endpoint: require_env("POLYSTORE_TABLE_URL")?,
                api_key: require_env("POLYSTORE_TABLE_KEY")?,
            }),
            other => Err(StoreError::Config(format!(
                "unknown backend '{}' (expected memory, mongodb, or table)",
                other
            ))),
        }
    }
}

fn require_env(name: &str) -> Result<String> {
    env::var(name)
        .map_err(|_| StoreError::Config(format!("{} must be set for the selected backend", name)))
}
