use crate::{MemoryPressure, MemoryPressureThresholds};

pub const MB: u64 = 1024 * 1024;

/// Memory budget of the object cache.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryBudget {
    pub max_bytes: u64,
    pub thresholds: MemoryPressureThresholds,
}

impl MemoryBudget {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            thresholds: MemoryPressureThresholds::default(),
        }
    }

    pub fn from_mb(max_mb: u64) -> Self {
        Self::new(max_mb.saturating_mul(MB))
    }

    /// Sets the fraction of the budget above which swapping starts.
    pub fn with_swap_watermark(mut self, watermark: f64) -> Self {
        self.thresholds.high = watermark;
        if self.thresholds.medium > watermark {
            self.thresholds.medium = watermark;
        }
        self
    }

    pub fn ratio(&self, usage_bytes: u64) -> f64 {
        if self.max_bytes == 0 {
            return f64::INFINITY;
        }
        usage_bytes as f64 / self.max_bytes as f64
    }

    pub fn pressure(&self, usage_bytes: u64) -> MemoryPressure {
        self.thresholds.level_for_ratio(self.ratio(usage_bytes))
    }

    /// `true` once usage reaches the budget; new entries bypass memory.
    pub fn is_exhausted(&self, usage_bytes: u64) -> bool {
        usage_bytes >= self.max_bytes
    }

    /// `true` while usage is above the swap watermark.
    pub fn needs_swap(&self, usage_bytes: u64) -> bool {
        self.pressure(usage_bytes) >= MemoryPressure::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_starts_above_watermark() {
        let budget = MemoryBudget::new(1_000);
        assert!(!budget.needs_swap(800));
        assert!(budget.needs_swap(801));
        assert!(!budget.is_exhausted(999));
        assert!(budget.is_exhausted(1_000));
        assert_eq!(budget.pressure(1_200), MemoryPressure::Critical);
    }

    #[test]
    fn custom_watermark_moves_swap_threshold() {
        let budget = MemoryBudget::new(1_000).with_swap_watermark(0.25);
        assert!(!budget.needs_swap(250));
        assert!(budget.needs_swap(251));
        assert_eq!(budget.pressure(100), MemoryPressure::Low);
    }

    #[test]
    fn zero_budget_is_always_exhausted() {
        let budget = MemoryBudget::new(0);
        assert!(budget.is_exhausted(0));
        assert!(budget.needs_swap(0));
    }
}
