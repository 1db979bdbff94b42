//! Institution Catalog - cached read-heavy catalog service
//!
//! Serves the full list of educational institutions from a single-entry,
//! time-bounded cache in front of a slow store. Concurrent misses share one
//! store fetch, and every successful write drops the cached snapshot before
//! it is acknowledged.
//!
//! # Architecture
//!
//! - **cache**: Single-entry TTL cell with invalidation generations
//! - **catalog**: Read path (single-flight fetch) and write path (persist, invalidate)
//! - **storage**: Store port and its SQLite implementation
//! - **web**: axum server and reqwest client for `/api/instituciones`
//! - **config**: YAML configuration with env/flag overrides
//! - **metrics**: Prometheus counters for cache and store traffic

// Core modules
pub mod cache;
pub mod catalog;
pub mod error;
pub mod storage;

// Surfaces
pub mod config;
pub mod logging;
pub mod metrics;
pub mod web;

// Re-exports
pub use catalog::{Catalog, CatalogConfig, CatalogStats, Snapshot};
pub use error::{CatalogError, Result, ServiceError};
pub use institutions::{Institution, NewInstitution};
