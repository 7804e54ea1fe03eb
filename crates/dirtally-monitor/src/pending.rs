use std::collections::HashSet;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

/// Directories removed since the last snapshot build.
#[derive(Debug, Default)]
pub struct PendingDeletions {
    paths: Mutex<HashSet<PathBuf>>,
}

impl PendingDeletions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, path: &Path) {
        self.paths.lock().insert(path.to_path_buf());
    }

    /// Forgets `path`, e.g. because the directory was recreated.
    pub fn remove(&self, path: &Path) -> bool {
        self.paths.lock().remove(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.lock().contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes every recorded path, leaving the set empty.
    pub fn drain(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = std::mem::take(&mut *self.paths.lock()).into_iter().collect();
        paths.sort();
        paths
    }
}
