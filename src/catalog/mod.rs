//! Institution catalog service
//!
//! Owns the cache cell and orchestrates both paths through it:
//!
//! - **Read path** ([`Catalog::list`]): serve the cached snapshot while it is
//!   fresh; on a miss, exactly one fetch runs against the store and every
//!   concurrent miss waits on that fetch instead of issuing its own.
//! - **Write path** ([`Catalog::create`]): persist, then invalidate before
//!   the caller sees the new record.
//!
//! A fetch that started before an invalidation never installs its snapshot,
//! so reads issued after a write's response always see data at least as new
//! as that write.
//!
//! # Example
//!
//! ```no_run
//! use institution_catalog::catalog::{Catalog, CatalogConfig};
//! use institution_catalog::storage::SqliteStore;
//! use institutions::NewInstitution;
//! use std::sync::Arc;
//!
//! # async fn demo() -> institution_catalog::Result<()> {
//! let store = Arc::new(SqliteStore::open_in_memory()?);
//! let catalog = Catalog::new(store, CatalogConfig::default());
//!
//! catalog.create(NewInstitution::new("Colegio Santa Librada")).await?;
//! let snapshot = catalog.list().await?;
//! assert_eq!(snapshot.len(), 1);
//! # Ok(())
//! # }
//! ```

mod flight;

use crate::cache::{CacheCell, CacheStats, Generation, Lookup};
use crate::error::ServiceError;
use crate::metrics;
use crate::storage::InstitutionStore;
use flight::{FetchOutcome, Flight, FlightSlot, SharedFetch};
use futures::FutureExt;
use institutions::{Institution, NewInstitution};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Immutable copy of the full record set from one fetch
pub type Snapshot = Arc<Vec<Institution>>;

/// Catalog configuration
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// How long a fetched snapshot is served before it is considered stale
    pub ttl: Duration,

    /// Upper bound on any single store call
    pub store_timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_millis(3_600_000),
            store_timeout: Duration::from_millis(10_000),
        }
    }
}

/// Catalog statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogStats {
    #[serde(flatten)]
    pub cache: CacheStats,
    /// Records in the fresh snapshot, if one is held
    pub cached_records: Option<usize>,
    pub store_fetches: u64,
    pub fetch_in_flight: bool,
    pub ttl_ms: u64,
}

struct Inner {
    store: Arc<dyn InstitutionStore>,
    cell: CacheCell<Snapshot>,
    flights: FlightSlot,
    store_fetches: AtomicU64,
    config: CatalogConfig,
}

/// What a miss should wait on
enum Ticket {
    Ready(Snapshot),
    Wait(SharedFetch),
}

/// Cached institution catalog. Cheap to clone; clones share one cache.
#[derive(Clone)]
pub struct Catalog {
    inner: Arc<Inner>,
}

impl Catalog {
    /// Create a catalog with an empty cache in front of `store`
    pub fn new(store: Arc<dyn InstitutionStore>, config: CatalogConfig) -> Self {
        tracing::debug!(
            ttl_ms = config.ttl.as_millis() as u64,
            store_timeout_ms = config.store_timeout.as_millis() as u64,
            "Creating catalog"
        );

        Self {
            inner: Arc::new(Inner {
                store,
                cell: CacheCell::new(),
                flights: FlightSlot::default(),
                store_fetches: AtomicU64::new(0),
                config,
            }),
        }
    }

    /// All records, from the cache when fresh
    pub async fn list(&self) -> Result<Snapshot, ServiceError> {
        if let Lookup::Hit(snapshot) = self.inner.cell.read_or_miss() {
            metrics::record_cache_hit();
            tracing::debug!(records = snapshot.len(), "Serving institutions from cache");
            return Ok(snapshot);
        }
        metrics::record_cache_miss();

        match self.join_or_start_fetch() {
            Ticket::Ready(snapshot) => Ok(snapshot),
            Ticket::Wait(fetch) => fetch.await,
        }
    }

    /// Persist a new record and invalidate the cache
    pub async fn create(&self, draft: NewInstitution) -> Result<Institution, ServiceError> {
        let timeout = self.inner.config.store_timeout;
        let started = Instant::now();

        let result = tokio::time::timeout(timeout, self.inner.store.persist(draft)).await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(Ok(record)) => {
                metrics::record_store_call("persist", "ok", elapsed);
                self.invalidate();
                tracing::info!(id = %record.id, "Institution created, cache invalidated");
                Ok(record)
            }
            Ok(Err(err)) => {
                metrics::record_store_call("persist", err.kind(), elapsed);
                tracing::error!(kind = err.kind(), error = %err, "Failed to persist institution");
                Err(err)
            }
            Err(_) => {
                // The write may still land; drop the snapshot rather than risk serving around it
                self.invalidate();
                let err = ServiceError::StoreUnavailable(format!(
                    "persist did not complete within {:?}",
                    timeout
                ));
                metrics::record_store_call("persist", err.kind(), elapsed);
                tracing::error!(kind = err.kind(), error = %err, "Failed to persist institution");
                Err(err)
            }
        }
    }

    /// Drop the cached snapshot
    pub fn invalidate(&self) {
        self.inner.cell.invalidate();
        metrics::record_cache_invalidate();
    }

    /// Current cache and fetch statistics
    pub fn stats(&self) -> CatalogStats {
        CatalogStats {
            cache: self.inner.cell.stats(),
            cached_records: self.inner.cell.peek().map(|snapshot| snapshot.len()),
            store_fetches: self.inner.store_fetches.load(Ordering::Relaxed),
            fetch_in_flight: self.inner.flights.is_busy(),
            ttl_ms: self.inner.config.ttl.as_millis() as u64,
        }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.inner.config
    }

    fn join_or_start_fetch(&self) -> Ticket {
        let mut slot = self.inner.flights.lock();

        // A fetch may have populated the cell since our miss
        if let Some(snapshot) = self.inner.cell.peek() {
            return Ticket::Ready(snapshot);
        }

        let generation = self.inner.cell.generation();
        if let Some(flight) = slot.as_ref().filter(|f| f.generation == generation) {
            tracing::debug!(flight = flight.id, "Joining in-flight fetch");
            return Ticket::Wait(flight.outcome.clone());
        }

        let id = self.inner.flights.next_id();
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(inner.run_fetch(id, generation));
        let outcome: SharedFetch = async move {
            task.await.unwrap_or_else(|e| {
                Err(ServiceError::StoreUnavailable(format!(
                    "fetch task failed: {}",
                    e
                )))
            })
        }
        .boxed()
        .shared();

        *slot = Some(Flight {
            id,
            generation,
            outcome: outcome.clone(),
        });

        Ticket::Wait(outcome)
    }
}

impl Inner {
    /// Fetch from the store and populate the cell.
    ///
    /// Runs as its own task so it completes even if every waiter goes away.
    async fn run_fetch(self: Arc<Self>, id: u64, generation: Generation) -> FetchOutcome {
        // Dropped last: after populate on success, during unwind on panic
        let _finish = self.flights.finish_on_drop(id);

        tracing::debug!(flight = id, generation, "Fetching institutions from store");
        self.store_fetches.fetch_add(1, Ordering::Relaxed);

        let timeout = self.config.store_timeout;
        let started = Instant::now();
        let result = tokio::time::timeout(timeout, self.store.fetch_all()).await;
        let elapsed = started.elapsed().as_secs_f64();

        let outcome = match result {
            Ok(Ok(records)) => Ok(Arc::new(records)),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ServiceError::FetchTimeout(timeout)),
        };

        match &outcome {
            Ok(snapshot) => {
                metrics::record_store_call("fetch_all", "ok", elapsed);
                if self
                    .cell
                    .populate_if_current(generation, Arc::clone(snapshot), self.config.ttl)
                {
                    metrics::record_cache_populate(snapshot.len());
                    tracing::info!(
                        records = snapshot.len(),
                        "Institutions fetched from store and cached"
                    );
                } else {
                    metrics::record_cache_discard();
                    tracing::info!(
                        records = snapshot.len(),
                        "Institutions fetched from store; cache was invalidated meanwhile"
                    );
                }
            }
            Err(err) => {
                metrics::record_store_call("fetch_all", err.kind(), elapsed);
                tracing::error!(kind = err.kind(), error = %err, "Failed to fetch institutions");
            }
        }

        outcome
    }
}
