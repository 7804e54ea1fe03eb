use std::path::{Path, PathBuf};

use dirtally_core::{path_bytes, path_from_bytes, Counters};
use redb::{Database, Durability, ReadableTable, TableDefinition};

use crate::{DurableStore, Result, StoreError};

const OBJECTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("objects");

/// [`DurableStore`] backed by a single redb database file.
///
/// Writes commit with eventual durability; [`DurableStore::sync`] commits an
/// immediate transaction to flush them.
pub struct RedbStore {
    db: Database,
    path: PathBuf,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").field("path", &self.path).finish()
    }
}

impl RedbStore {
    /// Opens (or creates) the database at `path`, creating parent
    /// directories as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        {
            txn.open_table(OBJECTS)?;
        }
        txn.commit()?;

        tracing::debug!(target = "dirtally.store", path = %path.display(), "opened object store");
        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn decode(key: &Path, bytes: &[u8]) -> Result<Counters> {
        Counters::from_le_bytes(bytes).ok_or_else(|| StoreError::Corrupt {
            key: key.to_path_buf(),
            len: bytes.len(),
        })
    }
}

impl DurableStore for RedbStore {
    fn get(&self, key: &Path) -> Result<Option<Counters>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(OBJECTS)?;
        let value = table.get(path_bytes(key))?;
        value
            .map(|guard| Self::decode(key, guard.value()))
            .transpose()
    }

    fn put(&self, key: &Path, value: Counters) -> Result<()> {
        let mut txn = self.db.begin_write()?;
        txn.set_durability(Durability::Eventual);
        {
            let mut table = txn.open_table(OBJECTS)?;
            table.insert(path_bytes(key), value.to_le_bytes().as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn delete(&self, key: &Path) -> Result<bool> {
        let mut txn = self.db.begin_write()?;
        txn.set_durability(Durability::Eventual);
        let removed = {
            let mut table = txn.open_table(OBJECTS)?;
            let removed = table.remove(path_bytes(key))?;
            removed.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    fn children(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut prefix = path_bytes(dir).to_vec();
        if prefix.last() != Some(&b'/') {
            prefix.push(b'/');
        }

        let txn = self.db.begin_read()?;
        let table = txn.open_table(OBJECTS)?;
        let mut keys = Vec::new();
        for item in table.range::<&[u8]>(prefix.as_slice()..)? {
            let (key, _) = item?;
            let key = key.value();
            let Some(rest) = key.strip_prefix(prefix.as_slice()) else {
                break;
            };
            if !rest.is_empty() && !rest.contains(&b'/') {
                keys.push(path_from_bytes(key));
            }
        }
        Ok(keys)
    }

    fn put_many(&self, entries: &[(PathBuf, Counters)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut txn = self.db.begin_write()?;
        txn.set_durability(Durability::Eventual);
        {
            let mut table = txn.open_table(OBJECTS)?;
            for (key, value) in entries {
                table.insert(path_bytes(key), value.to_le_bytes().as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        let mut txn = self.db.begin_write()?;
        txn.set_durability(Durability::Immediate);
        txn.commit()?;
        Ok(())
    }
}
