//! Durable key-value storage for per-path counters.
//!
//! The object cache keeps hot records in memory and treats a [`DurableStore`]
//! as the source of truth for everything else. Keys are absolute paths and
//! values are [`Counters`]. Implementations must be safe to call from many
//! lane workers at once.

mod error;
mod memory;
mod redb_store;

use std::path::{Path, PathBuf};

use dirtally_core::Counters;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use redb_store::RedbStore;

pub trait DurableStore: Send + Sync {
    fn get(&self, key: &Path) -> Result<Option<Counters>>;

    fn put(&self, key: &Path, value: Counters) -> Result<()>;

    /// Removes `key`; returns whether it was present.
    fn delete(&self, key: &Path) -> Result<bool>;

    /// Keys whose parent is exactly `dir`.
    fn children(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    /// Writes a batch of records. Implementations should make the batch
    /// atomic when the backend allows it.
    fn put_many(&self, entries: &[(PathBuf, Counters)]) -> Result<()> {
        for (key, value) in entries {
            self.put(key, *value)?;
        }
        Ok(())
    }

    /// Forces buffered writes to stable storage.
    fn sync(&self) -> Result<()> {
        Ok(())
    }
}
