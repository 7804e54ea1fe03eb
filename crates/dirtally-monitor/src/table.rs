use std::collections::HashMap;
use std::path::{Path, PathBuf};

use dirtally_core::{parent_dirs, sort_longest_first, Counters};
use parking_lot::{Mutex, RwLock};

/// Point-in-time copy of a tracked directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorEntry {
    pub path: PathBuf,
    pub level: u32,
    pub watched: bool,
    pub counts_size: bool,
    pub aggregate: Counters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted { level: u32 },
    /// The path was already tracked; nothing changed.
    AlreadyPresent,
    /// The nearest tracked ancestor is a leaf (level 1); the path is counted
    /// as part of that ancestor and gets no entry of its own.
    BelowLeafLevel,
}

impl AddOutcome {
    pub fn inserted(self) -> bool {
        matches!(self, AddOutcome::Inserted { .. })
    }
}

#[derive(Debug)]
struct Slot {
    level: u32,
    counts_size: bool,
    watched: bool,
    aggregate: Mutex<Counters>,
}

impl Slot {
    fn snapshot(&self, path: &Path) -> MonitorEntry {
        MonitorEntry {
            path: path.to_path_buf(),
            level: self.level,
            watched: self.watched,
            counts_size: self.counts_size,
            aggregate: *self.aggregate.lock(),
        }
    }
}

/// Concurrent map from directory to its aggregate counters.
///
/// The map lock is held only for a lookup or a structural change; aggregate
/// updates take the entry's own lock, so updates to different directories
/// proceed in parallel.
#[derive(Debug, Default)]
pub struct MonitorTable {
    entries: RwLock<HashMap<PathBuf, Slot>>,
}

impl MonitorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.read().contains_key(path)
    }

    pub fn find(&self, path: &Path) -> Option<MonitorEntry> {
        self.entries.read().get(path).map(|slot| slot.snapshot(path))
    }

    /// Adds `delta` to the aggregate of `path`. Returns the new aggregate,
    /// or `None` if the directory is not tracked.
    pub fn apply_delta(&self, path: &Path, delta: Counters) -> Option<Counters> {
        let entries = self.entries.read();
        let slot = entries.get(path)?;
        let mut aggregate = slot.aggregate.lock();
        *aggregate += delta;
        Some(*aggregate)
    }

    /// Applies `delta` to every tracked ancestor of `path`. Returns how many
    /// ancestors were updated.
    pub fn propagate_to_ancestors(&self, path: &Path, delta: Counters) -> usize {
        if delta.is_zero() {
            return 0;
        }
        let entries = self.entries.read();
        let mut updated = 0;
        for ancestor in parent_dirs(path) {
            if let Some(slot) = entries.get(ancestor) {
                *slot.aggregate.lock() += delta;
                updated += 1;
            }
        }
        updated
    }

    /// Nearest tracked ancestor of `path`, not including `path` itself.
    pub fn nearest_ancestor(&self, path: &Path) -> Option<MonitorEntry> {
        let entries = self.entries.read();
        parent_dirs(path).find_map(|ancestor| entries.get(ancestor).map(|slot| slot.snapshot(ancestor)))
    }

    /// Level a new entry at `path` would get: the nearest tracked ancestor's
    /// level minus one, or 1 when nothing above `path` is tracked.
    pub fn resolve_level(&self, path: &Path) -> u32 {
        match self.nearest_ancestor(path) {
            Some(ancestor) => ancestor.level.saturating_sub(1),
            None => 1,
        }
    }

    /// Whether files directly under `dir` record byte sizes. Taken from
    /// `dir` itself or its nearest tracked ancestor.
    pub fn counts_size_for(&self, dir: &Path) -> Option<bool> {
        let entries = self.entries.read();
        dir.ancestors()
            .find_map(|candidate| entries.get(candidate).map(|slot| slot.counts_size))
    }

    /// Inserts `path` if absent.
    ///
    /// A missing `level` is resolved with [`MonitorTable::resolve_level`]; a
    /// missing `counts_size` is inherited from the nearest tracked ancestor
    /// (size-tracked when there is none).
    pub fn add(&self, path: &Path, level: Option<u32>, counts_size: Option<bool>) -> AddOutcome {
        let mut entries = self.entries.write();
        if entries.contains_key(path) {
            return AddOutcome::AlreadyPresent;
        }

        let ancestor = parent_dirs(path).find_map(|ancestor| entries.get(ancestor));
        let level = match (level, ancestor) {
            (Some(level), _) => level,
            (None, Some(ancestor)) => ancestor.level.saturating_sub(1),
            (None, None) => 1,
        };
        if level == 0 {
            return AddOutcome::BelowLeafLevel;
        }
        let counts_size = counts_size
            .or_else(|| ancestor.map(|ancestor| ancestor.counts_size))
            .unwrap_or(true);

        entries.insert(
            path.to_path_buf(),
            Slot {
                level,
                counts_size,
                watched: false,
                aggregate: Mutex::new(Counters::ZERO),
            },
        );
        tracing::trace!(target = "dirtally.monitor", path = %path.display(), level, counts_size, "tracking directory");
        AddOutcome::Inserted { level }
    }

    /// Removes `path` only; tracked descendants are left for reconciliation
    /// to prune.
    pub fn remove(&self, path: &Path) -> Option<MonitorEntry> {
        self.entries
            .write()
            .remove(path)
            .map(|slot| slot.snapshot(path))
    }

    pub fn set_watched(&self, path: &Path, watched: bool) -> bool {
        match self.entries.write().get_mut(path) {
            Some(slot) => {
                slot.watched = watched;
                true
            }
            None => false,
        }
    }

    /// Tracked directories at or below `prefix`, longest path first.
    pub fn subtree(&self, prefix: &Path) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .entries
            .read()
            .keys()
            .filter(|path| path.starts_with(prefix))
            .cloned()
            .collect();
        sort_longest_first(&mut paths);
        paths
    }

    /// Tracked directories whose parent is `dir`.
    pub fn tracked_children(&self, dir: &Path) -> Vec<MonitorEntry> {
        self.entries
            .read()
            .iter()
            .filter(|(path, _)| path.parent() == Some(dir))
            .map(|(path, slot)| slot.snapshot(path))
            .collect()
    }

    /// Re-keys `from` and every tracked descendant under `to`. Returns the
    /// `(old, new)` pairs that moved. Existing entries at the target keys are
    /// replaced.
    pub fn rename_prefix(&self, from: &Path, to: &Path) -> Vec<(PathBuf, PathBuf)> {
        let mut entries = self.entries.write();
        let moving: Vec<PathBuf> = entries
            .keys()
            .filter(|path| path.starts_with(from))
            .cloned()
            .collect();

        let mut moved = Vec::with_capacity(moving.len());
        for old in moving {
            let Ok(rest) = old.strip_prefix(from) else {
                continue;
            };
            let new = if rest.as_os_str().is_empty() {
                to.to_path_buf()
            } else {
                to.join(rest)
            };
            if let Some(slot) = entries.remove(&old) {
                entries.insert(new.clone(), slot);
                moved.push((old, new));
            }
        }
        moved
    }

    /// `(path, aggregate)` for every tracked directory.
    pub fn export(&self) -> Vec<(PathBuf, Counters)> {
        self.entries
            .read()
            .iter()
            .map(|(path, slot)| (path.clone(), *slot.aggregate.lock()))
            .collect()
    }

    pub fn entries(&self) -> Vec<MonitorEntry> {
        self.entries
            .read()
            .iter()
            .map(|(path, slot)| slot.snapshot(path))
            .collect()
    }

    pub fn paths_longest_first(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.entries.read().keys().cloned().collect();
        sort_longest_first(&mut paths);
        paths
    }
}
