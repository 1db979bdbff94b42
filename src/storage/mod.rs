//! Storage layer
//!
//! The catalog needs two things from persistence: read the whole collection
//! and persist one record. `InstitutionStore` is that seam; `SqliteStore` is
//! the production implementation.

mod sqlite;

pub use sqlite::{SqliteStore, StoreConfig};

use crate::error::ServiceError;
use async_trait::async_trait;
use institutions::{Institution, NewInstitution};

/// Persistent collection of institution records
#[async_trait]
pub trait InstitutionStore: Send + Sync {
    /// Fetch every record, in insertion order.
    ///
    /// Fails with `StoreUnavailable` or `Store`.
    async fn fetch_all(&self) -> Result<Vec<Institution>, ServiceError>;

    /// Persist a draft and return the stored record with its assigned id.
    ///
    /// Fails with `StoreUnavailable` or `Validation`.
    async fn persist(&self, draft: NewInstitution) -> Result<Institution, ServiceError>;
}
