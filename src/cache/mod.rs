//! Cache layer for the institution snapshot
//!
//! Provides an in-memory, single-entry cell with lazy expiration and
//! generation-checked population.

mod cell;

pub use cell::{CacheCell, CacheStats, Generation, Lookup};
