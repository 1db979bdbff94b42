//! Prometheus metrics for the catalog
//!
//! Counters for cache traffic and store calls, exposed at `/metrics`.

use crate::Result;
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

lazy_static! {
    /// Counter: cache operations (hit/miss/populate/discard/invalidate)
    pub static ref CACHE_OPERATIONS: CounterVec = register_counter_vec!(
        "catalog_cache_operations_total",
        "Cache operations by type",
        &["operation"]
    )
    .expect("Failed to create cache_operations metric");

    /// Counter: store calls by operation and outcome
    pub static ref STORE_CALLS: CounterVec = register_counter_vec!(
        "catalog_store_calls_total",
        "Store calls by operation and outcome",
        &["operation", "outcome"]
    )
    .expect("Failed to create store_calls metric");

    /// Histogram: store call duration (seconds)
    pub static ref STORE_DURATION: HistogramVec = register_histogram_vec!(
        "catalog_store_duration_seconds",
        "Duration of store calls",
        &["operation"],
        vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to create store_duration metric");

    /// Gauge: records in the cached snapshot (0 when nothing is cached)
    pub static ref CACHED_RECORDS: Gauge = register_gauge!(
        "catalog_cached_records",
        "Number of records held in the cached snapshot"
    )
    .expect("Failed to create cached_records metric");
}

/// Record a cache hit
pub fn record_cache_hit() {
    CACHE_OPERATIONS.with_label_values(&["hit"]).inc();
}

/// Record a cache miss
pub fn record_cache_miss() {
    CACHE_OPERATIONS.with_label_values(&["miss"]).inc();
}

/// Record a snapshot install
pub fn record_cache_populate(records: usize) {
    CACHE_OPERATIONS.with_label_values(&["populate"]).inc();
    CACHED_RECORDS.set(records as f64);
}

/// Record a fetched snapshot that was not installed because of a newer write
pub fn record_cache_discard() {
    CACHE_OPERATIONS.with_label_values(&["discard"]).inc();
}

/// Record an invalidation
pub fn record_cache_invalidate() {
    CACHE_OPERATIONS.with_label_values(&["invalidate"]).inc();
    CACHED_RECORDS.set(0.0);
}

/// Sync the cached-records gauge with the cell.
///
/// Expiry is lazy and never passes through the populate/invalidate hooks, so
/// the gauge is refreshed from the cell before each scrape.
pub fn set_cached_records(records: Option<usize>) {
    CACHED_RECORDS.set(cached_records_value(records));
}

fn cached_records_value(records: Option<usize>) -> f64 {
    records.unwrap_or(0) as f64
}

/// Record a store call and its duration; `outcome` is `ok` or an error kind
pub fn record_store_call(operation: &str, outcome: &str, duration_secs: f64) {
    STORE_CALLS.with_label_values(&[operation, outcome]).inc();
    STORE_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);
}

/// Encode all metrics as Prometheus text format
pub fn encode_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(anyhow::Error::new)?;
    Ok(String::from_utf8(buffer).map_err(anyhow::Error::new)?)
}
