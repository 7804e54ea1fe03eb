use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel as channel;
use dirtally_cache::{CacheConfig, ObjectCache};
use dirtally_config::{load_watch_roots, DaemonConfig, WatchRoot};
use dirtally_core::{sort_longest_first, Counters};
use dirtally_memory::MemoryBudget;
use dirtally_monitor::{ExcludeMatcher, MonitorTable, PendingDeletions};
use dirtally_scheduler::{DispatcherConfig, JobDispatcher, JobResult, LaneLayout};
use dirtally_snapshot::{BuildReport, SnapshotBuilder};
use dirtally_store::DurableStore;
use dirtally_watch::{EventKind, FileWatcher, RawEvent, WatchEvent, WatchMessage};
use parking_lot::Mutex;

use crate::files::FileOp;
use crate::reconcile::ReconcileReport;
use crate::{Result, RouterError, ShutdownSignal};

#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    pub layout: LaneLayout,
    pub high_water_mark: usize,
    pub cache: CacheConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            layout: LaneLayout::default(),
            high_water_mark: 100_000,
            cache: CacheConfig::default(),
        }
    }
}

impl RouterConfig {
    pub fn from_daemon(config: &DaemonConfig) -> Self {
        Self {
            layout: LaneLayout::new(config.sharded_lanes),
            high_water_mark: config.high_water_mark,
            cache: CacheConfig {
                buckets: config.cache_buckets,
                budget: MemoryBudget::new(config.max_memory_bytes())
                    .with_swap_watermark(config.swap_high_watermark),
            },
        }
    }
}

/// State shared by every job the router schedules.
pub(crate) struct Shared {
    pub(crate) table: MonitorTable,
    pub(crate) cache: ObjectCache,
    pub(crate) excludes: ExcludeMatcher,
    pub(crate) pending: PendingDeletions,
    pub(crate) dispatcher: JobDispatcher,
    pub(crate) watcher: Mutex<Box<dyn FileWatcher>>,
    /// Symlinks to directories that are tracked as directories.
    pub(crate) symlinks: Mutex<HashSet<PathBuf>>,
    /// Source of the last moved-from event, consumed by the next moved-to.
    pub(crate) move_slot: Mutex<Option<PathBuf>>,
    /// Consecutive reconciliation mismatches per directory.
    pub(crate) mismatches: Mutex<HashMap<PathBuf, u32>>,
    pub(crate) build_complete: AtomicBool,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.dispatcher.shutdown();
    }
}

/// Turns filesystem events into ordered updates of the monitor table and
/// object cache.
#[derive(Clone)]
pub struct EventRouter {
    shared: Arc<Shared>,
    events: channel::Receiver<WatchMessage>,
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("tracked", &self.shared.table.len())
            .field("cache", &self.shared.cache)
            .field("dispatcher", &self.shared.dispatcher)
            .finish()
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.as_encoded_bytes().first() == Some(&b'.'))
}

pub(crate) fn is_symlink_to_dir(path: &Path) -> bool {
    let is_link = std::fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false);
    is_link && path.is_dir()
}

impl EventRouter {
    /// Starts the lane workers. `watcher` receives watch registrations; its
    /// event stream is exposed through [`EventRouter::events`].
    pub fn new(config: RouterConfig, store: Arc<dyn DurableStore>, watcher: Box<dyn FileWatcher>) -> Result<Self> {
        let dispatcher = JobDispatcher::start(DispatcherConfig {
            layout: config.layout,
            high_water_mark: config.high_water_mark,
            ..DispatcherConfig::default()
        })?;
        let events = watcher.receiver().clone();

        let shared = Arc::new(Shared {
            table: MonitorTable::new(),
            cache: ObjectCache::new(config.cache, store),
            excludes: ExcludeMatcher::new(),
            pending: PendingDeletions::new(),
            dispatcher,
            watcher: Mutex::new(watcher),
            symlinks: Mutex::default(),
            move_slot: Mutex::default(),
            mismatches: Mutex::default(),
            build_complete: AtomicBool::new(false),
        });
        Ok(Self { shared, events })
    }

    pub fn table(&self) -> &MonitorTable {
        &self.shared.table
    }

    pub fn cache(&self) -> &ObjectCache {
        &self.shared.cache
    }

    pub fn excludes(&self) -> &ExcludeMatcher {
        &self.shared.excludes
    }

    pub fn pending_deletions(&self) -> &PendingDeletions {
        &self.shared.pending
    }

    pub fn dispatcher(&self) -> &JobDispatcher {
        &self.shared.dispatcher
    }

    pub fn events(&self) -> &channel::Receiver<WatchMessage> {
        &self.events
    }

    /// Current aggregate of a tracked directory.
    pub fn aggregate(&self, dir: &Path) -> Option<Counters> {
        self.shared.table.find(dir).map(|entry| entry.aggregate)
    }

    pub fn is_tracked_symlink(&self, path: &Path) -> bool {
        self.shared.symlinks.lock().contains(path)
    }

    pub fn is_build_complete(&self) -> bool {
        self.shared.build_complete.load(Ordering::Acquire)
    }

    /// Routes one watcher message.
    pub fn handle_message(&self, msg: WatchMessage) {
        match msg {
            Ok(WatchEvent::Event(event)) => {
                if let Err(err) = self.dispatch(event) {
                    tracing::warn!(target = "dirtally.router", error = %err, "failed to queue event");
                }
            }
            Ok(WatchEvent::Rescan) => {
                tracing::warn!(target = "dirtally.router", "watcher dropped events; scheduling full reconciliation");
                if let Err(err) = self.schedule_rescan() {
                    tracing::warn!(target = "dirtally.router", error = %err, "failed to schedule reconciliation");
                }
            }
            Err(err) => {
                tracing::warn!(target = "dirtally.router", error = %err, "watcher error");
            }
        }
    }

    /// Queues `event` on the classification lane.
    pub fn dispatch(&self, event: RawEvent) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        self.shared
            .dispatcher
            .submit(LaneLayout::CLASSIFY, move || shared.classify(event))?;
        Ok(())
    }

    fn schedule_rescan(&self) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        self.shared.dispatcher.submit(LaneLayout::POSTED, move || {
            let report = shared.reconcile_once(&ShutdownSignal::never(), Duration::ZERO, true)?;
            tracing::info!(
                target = "dirtally.router",
                checked = report.checked,
                corrected = report.corrected,
                pruned = report.pruned,
                "rescan reconciliation finished"
            );
            Ok(())
        })?;
        Ok(())
    }

    /// Registers the exclusion patterns of `root`. Patterns are never removed.
    pub fn add_exclude_patterns(&self, root: &WatchRoot) -> Result<usize> {
        let mut added = 0;
        for pattern in root.exclude_patterns() {
            match self.shared.excludes.add_pattern(&pattern) {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(source) => return Err(RouterError::Pattern { pattern, source }),
            }
        }
        Ok(added)
    }

    /// Registers and watches `root` and its subdirectories down to level 1.
    /// Returns the directories that were not tracked before.
    pub fn register_root(&self, root: &WatchRoot) -> Result<Vec<PathBuf>> {
        self.add_exclude_patterns(root)?;
        if !root.path.is_dir() {
            tracing::warn!(target = "dirtally.router", path = %root.path.display(), "watch root is not a directory; skipping");
            return Ok(Vec::new());
        }
        Ok(self
            .shared
            .register_tree(&root.path, Some(root.level), Some(root.counts_size)))
    }

    /// Registers every root, counts every tracked directory and marks the
    /// build complete once the sharded lanes have drained.
    pub fn initial_build(&self, roots: &[WatchRoot]) -> Result<()> {
        for root in roots {
            if let Err(err) = self.register_root(root) {
                tracing::error!(target = "dirtally.router", path = %root.path.display(), error = %err, "skipping watch root");
            }
        }

        let dirs = self.shared.table.paths_longest_first();
        for dir in &dirs {
            if let Err(err) = self.shared.prime_dir(dir) {
                tracing::warn!(target = "dirtally.router", path = %dir.display(), error = %err, "failed to count directory");
            }
        }
        self.shared.dispatcher.wait_sharded_idle();
        self.shared.build_complete.store(true, Ordering::Release);
        tracing::info!(target = "dirtally.router", dirs = dirs.len(), "initial build complete");
        Ok(())
    }

    /// Re-reads the watch-root list and starts tracking roots and
    /// subdirectories that appeared since the last read. Returns how many
    /// directories were added.
    pub fn reload_roots(&self, path: &Path) -> Result<usize> {
        let roots = load_watch_roots(path)?;
        let mut added_total = 0;
        for root in &roots {
            let mut added = match self.register_root(root) {
                Ok(added) => added,
                Err(err) => {
                    tracing::warn!(target = "dirtally.router", path = %root.path.display(), error = %err, "skipping watch root");
                    continue;
                }
            };
            if added.is_empty() {
                continue;
            }
            added_total += added.len();
            sort_longest_first(&mut added);

            let shared = Arc::clone(&self.shared);
            self.shared.dispatcher.submit(LaneLayout::POSTED, move || -> JobResult {
                shared.dispatcher.wait_sharded_idle();
                for dir in &added {
                    shared.prime_dir(dir)?;
                }
                Ok(())
            })?;
        }
        if added_total > 0 {
            tracing::info!(target = "dirtally.router", added = added_total, "watch roots reloaded");
        }
        Ok(added_total)
    }

    /// Compares every tracked directory against the filesystem, longest path
    /// first, pausing `pause` between directories.
    pub fn reconcile_once(&self, shutdown: &ShutdownSignal, pause: Duration) -> Result<ReconcileReport> {
        self.shared.reconcile_once(shutdown, pause, false)
    }

    /// Drains pending deletions and publishes a snapshot of the table.
    pub fn build_snapshot(&self, builder: &SnapshotBuilder) -> Result<BuildReport> {
        Ok(builder.build(&self.shared.table, &self.shared.pending)?)
    }

    /// Blocks until every lane is idle and no job is left anywhere.
    pub fn settle(&self) {
        let lanes = 0..self.shared.dispatcher.layout().total();
        loop {
            self.shared.dispatcher.wait_idle(lanes.clone());
            if self.shared.dispatcher.pending() == 0 {
                break;
            }
        }
    }

    /// Stops the lanes after they drain and flushes the cache to the store.
    pub fn shutdown(&self) -> Result<()> {
        self.shared.dispatcher.shutdown();
        let report = self.shared.cache.flush_all()?;
        tracing::info!(target = "dirtally.router", entries = report.entries, "flushed object cache");
        Ok(())
    }
}

impl Shared {
    fn classify(self: &Arc<Self>, event: RawEvent) -> JobResult {
        let RawEvent { path, kind, is_dir } = event;
        if is_hidden(&path) {
            return Ok(());
        }
        tracing::trace!(target = "dirtally.router", path = %path.display(), ?kind, is_dir, "event");

        match kind {
            EventKind::Create => {
                if is_dir {
                    self.dir_created(&path)?;
                } else if is_symlink_to_dir(&path) {
                    self.symlinks.lock().insert(path.clone());
                    self.dir_created(&path)?;
                } else {
                    self.submit_file(path, FileOp::Insert)?;
                }
            }
            EventKind::CloseWrite => {
                if !is_dir {
                    self.submit_file(path, FileOp::Rewrite)?;
                }
            }
            EventKind::Delete => {
                if self.symlinks.lock().remove(&path) {
                    self.symlink_dir_deleted(&path);
                } else if is_dir || self.table.contains(&path) {
                    self.dir_deleted(&path);
                } else {
                    self.submit_file(path, FileOp::Remove)?;
                }
            }
            EventKind::DeleteSelf => {
                if self.symlinks.lock().remove(&path) {
                    self.symlink_dir_deleted(&path);
                } else {
                    self.dir_deleted_self(&path);
                }
            }
            EventKind::MovedFrom => {
                let structural =
                    is_dir || self.table.contains(&path) || self.symlinks.lock().contains(&path);
                *self.move_slot.lock() = Some(path.clone());
                if !structural {
                    self.submit_file(path, FileOp::Remove)?;
                }
            }
            EventKind::MovedTo => {
                let from = self.move_slot.lock().take();
                if is_dir || is_symlink_to_dir(&path) {
                    self.dir_moved(from, &path)?;
                } else {
                    self.submit_file(path, FileOp::Insert)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn submit_file(self: &Arc<Self>, path: PathBuf, op: FileOp) -> Result<()> {
        let shared = Arc::clone(self);
        let key = path.clone();
        self.dispatcher.submit_for_path(&key, move || {
            shared.apply_file(&path, op)?;
            Ok(())
        })?;
        Ok(())
    }
}
