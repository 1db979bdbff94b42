//! Error types for the institution catalog
//!
//! `ServiceError` covers the failures of the cache core and the store it
//! shields. It is `Clone` so a single store outcome can be handed to every
//! caller waiting on the same fetch. `CatalogError` wraps it together with the
//! ambient failures (configuration, I/O, server startup, ...).

use std::time::Duration;
use thiserror::Error;

/// Result type alias for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Failures of the read and write paths
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The store could not be reached (connection, lock contention, worker failure)
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store reported a fault while reading
    #[error("Store error: {0}")]
    Store(String),

    /// The store rejected a write
    #[error("Validation error: {0}")]
    Validation(String),

    /// A store call exceeded its time bound
    #[error("Store call timed out after {0:?}")]
    FetchTimeout(Duration),
}

impl ServiceError {
    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::StoreUnavailable(_) => "store_unavailable",
            ServiceError::Store(_) => "store_error",
            ServiceError::Validation(_) => "validation_error",
            ServiceError::FetchTimeout(_) => "fetch_timeout",
        }
    }
}

impl From<institutions::Error> for ServiceError {
    fn from(err: institutions::Error) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

/// Comprehensive error type for the catalog process
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Read/write path failures
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// SQLite errors outside of the read/write paths (open, schema)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Anyhow errors (for more context)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

impl From<institutions::Error> for CatalogError {
    fn from(err: institutions::Error) -> Self {
        CatalogError::Service(err.into())
    }
}
