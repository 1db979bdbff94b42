//! Single-entry, time-bounded cache cell

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Invalidation counter observed on a miss.
///
/// Every `invalidate` advances it, so a populate tagged with an older value
/// is known to carry data from before that invalidation.
pub type Generation = u64;

/// Outcome of [`CacheCell::read_or_miss`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    /// A fresh value
    Hit(T),
    /// Nothing fresh is cached
    Miss { generation: Generation },
}

#[derive(Debug)]
struct Entry<T> {
    value: T,
    populated_at: Instant,
    expires_at: Instant,
}

impl<T> Entry<T> {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug)]
struct CellState<T> {
    entry: Option<Entry<T>>,
    generation: Generation,
}

/// Holds at most one cached value and its expiration.
///
/// All transitions happen under one mutex that is held only for the swap.
/// Expiration is checked lazily on access; a stale entry is cleared by the
/// read that observes it.
#[derive(Debug)]
pub struct CacheCell<T> {
    state: Mutex<CellState<T>>,
    hits: AtomicU64,
    misses: AtomicU64,
    populates: AtomicU64,
    invalidations: AtomicU64,
}

impl<T: Clone> CacheCell<T> {
    /// Create an empty cell
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CellState {
                entry: None,
                generation: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            populates: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Return the cached value if it is still fresh, otherwise a miss
    pub fn read_or_miss(&self) -> Lookup<T> {
        let now = Instant::now();
        let mut state = self.state.lock();

        if let Some(entry) = state.entry.as_ref() {
            if entry.is_fresh(now) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Lookup::Hit(entry.value.clone());
            }
            tracing::debug!("Cached snapshot expired");
            state.entry = None;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        Lookup::Miss {
            generation: state.generation,
        }
    }

    /// Replace the entry with `value`, fresh for `ttl`. Last writer wins.
    pub fn populate(&self, value: T, ttl: Duration) {
        let mut state = self.state.lock();
        self.install(&mut state, value, ttl);
    }

    /// Like [`populate`](Self::populate), but only if nothing was invalidated
    /// since `generation` was observed. Returns whether the value was installed.
    pub fn populate_if_current(&self, generation: Generation, value: T, ttl: Duration) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            tracing::debug!(
                observed = generation,
                current = state.generation,
                "Discarding snapshot fetched before an invalidation"
            );
            return false;
        }
        self.install(&mut state, value, ttl);
        true
    }

    /// Drop the cached entry. Idempotent.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.entry = None;
        state.generation = state.generation.wrapping_add(1);
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Current generation
    pub fn generation(&self) -> Generation {
        self.state.lock().generation
    }

    /// The fresh value, if any, without touching the hit/miss counters
    pub fn peek(&self) -> Option<T> {
        let now = Instant::now();
        let state = self.state.lock();
        state
            .entry
            .as_ref()
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.value.clone())
    }

    /// Current statistics
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let state = self.state.lock();
        let fresh = state.entry.as_ref().filter(|entry| entry.is_fresh(now));

        CacheStats {
            populated: fresh.is_some(),
            age_ms: fresh.map(|entry| millis(now.duration_since(entry.populated_at))),
            expires_in_ms: fresh.map(|entry| millis(entry.expires_at.duration_since(now))),
            generation: state.generation,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            populates: self.populates.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    fn install(&self, state: &mut CellState<T>, value: T, ttl: Duration) {
        let now = Instant::now();
        // A TTL too large for the clock saturates at "far future"
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365 * 30));
        state.entry = Some(Entry {
            value,
            populated_at: now,
            expires_at,
        });
        self.populates.fetch_add(1, Ordering::Relaxed);
    }
}

impl<T: Clone> Default for CacheCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Whether a fresh entry is held
    pub populated: bool,
    pub age_ms: Option<u64>,
    pub expires_in_ms: Option<u64>,
    pub generation: Generation,
    pub hits: u64,
    pub misses: u64,
    pub populates: u64,
    pub invalidations: u64,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const TTL: Duration = Duration::from_millis(1000);

    #[tokio::test(start_paused = true)]
    async fn test_empty_cell_misses() {
        let cell: CacheCell<u32> = CacheCell::new();
        assert_eq!(cell.read_or_miss(), Lookup::Miss { generation: 0 });
        assert_eq!(cell.stats().misses, 1);
        assert!(!cell.stats().populated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_populate_then_hit_until_expiry() {
        let cell = CacheCell::new();
        let snapshot = Arc::new(vec![1, 2, 3]);
        cell.populate(snapshot.clone(), TTL);

        tokio::time::advance(Duration::from_millis(999)).await;
        match cell.read_or_miss() {
            Lookup::Hit(value) => assert!(Arc::ptr_eq(&value, &snapshot)),
            Lookup::Miss { .. } => panic!("expected a hit before expiry"),
        }

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(matches!(cell.read_or_miss(), Lookup::Miss { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_is_cleared_on_read() {
        let cell = CacheCell::new();
        cell.populate("old", TTL);
        tokio::time::advance(Duration::from_millis(1500)).await;

        assert!(matches!(cell.read_or_miss(), Lookup::Miss { .. }));
        assert!(cell.state.lock().entry.is_none());
        assert!(matches!(cell.read_or_miss(), Lookup::Miss { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_writer_wins() {
        let cell = CacheCell::new();
        cell.populate("first", TTL);
        cell.populate("second", TTL);
        assert_eq!(cell.read_or_miss(), Lookup::Hit("second"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_populate_restarts_ttl() {
        let cell = CacheCell::new();
        cell.populate("a", TTL);
        tokio::time::advance(Duration::from_millis(800)).await;
        cell.populate("b", TTL);
        tokio::time::advance(Duration::from_millis(800)).await;
        assert_eq!(cell.read_or_miss(), Lookup::Hit("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_is_idempotent() {
        let cell = CacheCell::new();
        cell.populate(7u8, TTL);

        cell.invalidate();
        cell.invalidate();

        assert_eq!(cell.read_or_miss(), Lookup::Miss { generation: 2 });
        assert_eq!(cell.generation(), 2);
        let stats = cell.stats();
        assert_eq!(stats.invalidations, 2);
        assert!(!stats.populated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_populate_if_current_rejects_older_generation() {
        let cell = CacheCell::new();
        let generation = match cell.read_or_miss() {
            Lookup::Miss { generation } => generation,
            Lookup::Hit(_) => unreachable!(),
        };

        cell.invalidate();
        assert!(!cell.populate_if_current(generation, "pre-write", TTL));
        assert!(matches!(cell.read_or_miss(), Lookup::Miss { generation: 1 }));

        assert!(cell.populate_if_current(1, "post-write", TTL));
        assert_eq!(cell.read_or_miss(), Lookup::Hit("post-write"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_never_hits() {
        let cell = CacheCell::new();
        cell.populate(1, Duration::ZERO);
        assert!(matches!(cell.read_or_miss(), Lookup::Miss { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_peek_does_not_count() {
        let cell = CacheCell::new();
        assert_eq!(cell.peek(), None::<u8>);
        cell.populate(3u8, TTL);
        assert_eq!(cell.peek(), Some(3));

        let stats = cell.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_age_and_remaining() {
        let cell = CacheCell::new();
        cell.populate((), TTL);
        tokio::time::advance(Duration::from_millis(250)).await;

        let stats = cell.stats();
        assert!(stats.populated);
        assert_eq!(stats.age_ms, Some(250));
        assert_eq!(stats.expires_in_ms, Some(750));
        assert_eq!(stats.populates, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_ttl_does_not_overflow() {
        let cell = CacheCell::new();
        cell.populate(1, Duration::MAX);
        assert_eq!(cell.read_or_miss(), Lookup::Hit(1));
    }
}
