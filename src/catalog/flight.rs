//! Single-flight bookkeeping for store fetches

use super::Snapshot;
use crate::cache::Generation;
use crate::error::ServiceError;
use futures::future::{BoxFuture, Shared};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};

/// Result of one fetch, handed to every caller that waited on it
pub(super) type FetchOutcome = Result<Snapshot, ServiceError>;

/// Cloneable handle on an in-progress fetch
pub(super) type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

/// The fetch currently servicing misses
pub(super) struct Flight {
    pub id: u64,
    /// Cache generation the fetch will populate
    pub generation: Generation,
    pub outcome: SharedFetch,
}

/// Holds at most one in-progress fetch.
///
/// The guard returned by [`lock`](Self::lock) must never be held across an
/// await.
#[derive(Default)]
pub(super) struct FlightSlot {
    current: Mutex<Option<Flight>>,
    next_id: AtomicU64,
}

impl FlightSlot {
    pub fn lock(&self) -> MutexGuard<'_, Option<Flight>> {
        self.current.lock()
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Clear the slot if it still holds flight `id`
    pub fn finish(&self, id: u64) {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|flight| flight.id == id) {
            *current = None;
        }
    }

    /// Guard that calls [`finish`](Self::finish) when dropped, including
    /// while unwinding from a panicking fetch
    pub fn finish_on_drop(&self, id: u64) -> FinishGuard<'_> {
        FinishGuard { slot: self, id }
    }

    pub fn is_busy(&self) -> bool {
        self.current.lock().is_some()
    }
}

pub(super) struct FinishGuard<'a> {
    slot: &'a FlightSlot,
    id: u64,
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.slot.finish(self.id);
    }
}
