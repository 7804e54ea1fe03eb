use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Granularity of [`MemoryTracker`] accounting.
pub const QUANTUM_BYTES: u64 = 4;

/// Shared, quantized byte counter.
///
/// Sizes are rounded to the nearest [`QUANTUM_BYTES`] before being added, and
/// the same rounding is applied on removal, so add/sub of one size always
/// cancel out.
#[derive(Clone, Default)]
pub struct MemoryTracker {
    usage_units: Arc<AtomicU64>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn units_for(bytes: u64) -> u64 {
        let units = bytes / QUANTUM_BYTES;
        if bytes % QUANTUM_BYTES >= QUANTUM_BYTES / 2 {
            units + 1
        } else {
            units
        }
    }

    pub fn add_bytes(&self, bytes: u64) {
        self.usage_units
            .fetch_add(Self::units_for(bytes), Ordering::Relaxed);
    }

    pub fn sub_bytes(&self, bytes: u64) {
        let delta = Self::units_for(bytes);
        let mut current = self.usage_units.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_sub(delta);
            match self.usage_units.compare_exchange(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn bytes(&self) -> u64 {
        self.usage_units
            .load(Ordering::Relaxed)
            .saturating_mul(QUANTUM_BYTES)
    }
}

impl std::fmt::Debug for MemoryTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTracker")
            .field("bytes", &self.bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_nearest_quantum() {
        let tracker = MemoryTracker::new();
        tracker.add_bytes(5);
        assert_eq!(tracker.bytes(), 4);
        tracker.add_bytes(6);
        assert_eq!(tracker.bytes(), 12);
        tracker.sub_bytes(6);
        tracker.sub_bytes(5);
        assert_eq!(tracker.bytes(), 0);
    }

    #[test]
    fn subtraction_saturates() {
        let tracker = MemoryTracker::new();
        tracker.add_bytes(8);
        tracker.sub_bytes(100);
        assert_eq!(tracker.bytes(), 0);
    }

    #[test]
    fn clones_share_the_counter() {
        let tracker = MemoryTracker::new();
        let other = tracker.clone();
        other.add_bytes(400);
        assert_eq!(tracker.bytes(), 400);
    }
}
