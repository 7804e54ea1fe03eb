use std::ops::Range;
use std::path::Path;

use dirtally_core::{path_bytes, rs_hash};

/// Fixed partition of dispatcher lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneLayout {
    sharded: usize,
}

impl LaneLayout {
    /// Lane running posted directory builds.
    pub const POSTED: usize = 0;
    /// Lane classifying raw filesystem events.
    pub const CLASSIFY: usize = 1;
    /// First of the sharded lanes.
    pub const FIRST_SHARDED: usize = 2;

    pub fn new(sharded: usize) -> Self {
        Self {
            sharded: sharded.max(1),
        }
    }

    pub fn sharded(&self) -> usize {
        self.sharded
    }

    pub fn total(&self) -> usize {
        Self::FIRST_SHARDED + self.sharded
    }

    pub fn sharded_range(&self) -> Range<usize> {
        Self::FIRST_SHARDED..self.total()
    }

    /// Sharded lane owning `path`. Stable for the lifetime of the layout.
    pub fn lane_for_path(&self, path: &Path) -> usize {
        Self::FIRST_SHARDED + (rs_hash(path_bytes(path)) as usize % self.sharded)
    }
}

impl Default for LaneLayout {
    fn default() -> Self {
        Self::new(128)
    }
}
