//! Memory budgeting and accounting for the object cache.
//!
//! Accounting is approximate and driven by the owning component: the cache
//! reports the size of each resident entry, the tracker stores it in coarse
//! units to keep the shared counter cheap, and the budget turns the tracked
//! total into write-through and swap decisions.

mod budget;
mod pressure;
mod tracker;

pub use budget::{MemoryBudget, MB};
pub use pressure::{MemoryPressure, MemoryPressureThresholds};
pub use tracker::{MemoryTracker, QUANTUM_BYTES};
