#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dirtally_cache::CacheConfig;
use dirtally_config::WatchRoot;
use dirtally_core::Counters;
use dirtally_memory::MemoryBudget;
use dirtally_router::{EventRouter, RouterConfig};
use dirtally_scheduler::LaneLayout;
use dirtally_store::MemoryStore;
use dirtally_watch::{EventKind, ManualFileWatcher, ManualFileWatcherHandle, RawEvent};
use tempfile::TempDir;

pub fn small_config() -> RouterConfig {
    RouterConfig {
        layout: LaneLayout::new(4),
        high_water_mark: 10_000,
        cache: CacheConfig {
            buckets: 64,
            budget: MemoryBudget::from_mb(16),
        },
    }
}

/// A router over a temporary tree rooted at `<tmp>/w`, fed events by hand.
pub struct Fixture {
    pub tmp: TempDir,
    pub root: PathBuf,
    pub router: EventRouter,
    pub watcher: ManualFileWatcherHandle,
    pub store: Arc<MemoryStore>,
}

impl Fixture {
    pub fn new() -> Self {
        // tempfile's default prefix starts with a dot, which the router skips.
        let tmp = tempfile::Builder::new().prefix("dirtally").tempdir().unwrap();
        let root = tmp.path().join("w");
        fs::create_dir(&root).unwrap();

        let watcher = ManualFileWatcher::new();
        let handle = watcher.handle();
        let store = Arc::new(MemoryStore::new());
        let router = EventRouter::new(small_config(), store.clone(), Box::new(watcher)).unwrap();
        Self {
            tmp,
            root,
            router,
            watcher: handle,
            store,
        }
    }

    pub fn watch_root(&self, level: u32) -> WatchRoot {
        WatchRoot {
            path: self.root.clone(),
            level,
            excludes: Vec::new(),
            counts_size: true,
        }
    }

    pub fn build(&self, roots: &[WatchRoot]) {
        self.router.initial_build(roots).unwrap();
        self.router.settle();
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Writes `len` bytes to `rel`, creating parent directories.
    pub fn write(&self, rel: &str, len: usize) -> PathBuf {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, vec![b'x'; len]).unwrap();
        path
    }

    pub fn mkdir(&self, rel: &str) -> PathBuf {
        let path = self.path(rel);
        fs::create_dir_all(&path).unwrap();
        path
    }

    pub fn send(&self, path: &Path, kind: EventKind, is_dir: bool) {
        self.router.dispatch(RawEvent::new(path, kind, is_dir)).unwrap();
    }

    pub fn send_and_settle(&self, path: &Path, kind: EventKind, is_dir: bool) {
        self.send(path, kind, is_dir);
        self.router.settle();
    }

    pub fn aggregate(&self, rel: &str) -> Counters {
        let path = if rel.is_empty() { self.root.clone() } else { self.path(rel) };
        self.router
            .aggregate(&path)
            .unwrap_or_else(|| panic!("{} is not tracked", path.display()))
    }

    pub fn is_tracked(&self, rel: &str) -> bool {
        self.router.table().contains(&self.path(rel))
    }
}
