use std::collections::HashMap;
use std::path::{Path, PathBuf};

use dirtally_core::Counters;
use parking_lot::RwLock;

use crate::{DurableStore, Result};

/// In-process store. Used by tests and by daemons that do not need the
/// cache to survive a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<PathBuf, Counters>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn contains(&self, key: &Path) -> bool {
        self.records.read().contains_key(key)
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &Path) -> Result<Option<Counters>> {
        Ok(self.records.read().get(key).copied())
    }

    fn put(&self, key: &Path, value: Counters) -> Result<()> {
        self.records.write().insert(key.to_path_buf(), value);
        Ok(())
    }

    fn delete(&self, key: &Path) -> Result<bool> {
        Ok(self.records.write().remove(key).is_some())
    }

    fn children(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        Ok(self
            .records
            .read()
            .keys()
            .filter(|key| key.parent() == Some(dir))
            .cloned()
            .collect())
    }

    fn put_many(&self, entries: &[(PathBuf, Counters)]) -> Result<()> {
        let mut records = self.records.write();
        for (key, value) in entries {
            records.insert(key.clone(), *value);
        }
        Ok(())
    }
}
