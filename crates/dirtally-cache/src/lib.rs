//! Bounded write-back cache of per-path counters.
//!
//! [`ObjectCache`] keeps recently written records in a lock-striped hash
//! table and falls through to a [`DurableStore`](dirtally_store::DurableStore)
//! for everything else. Memory is accounted with a quantized
//! [`MemoryTracker`](dirtally_memory::MemoryTracker); once the budget is
//! exhausted new records are written straight through, and
//! [`ObjectCache::swap_one`] evicts whole buckets to the store.

mod cache;

pub use cache::{CacheConfig, ObjectCache, SwapReport, BUCKETS_PER_LOCK, SWAP_RANDOM_PROBES};
