use std::fs;
use std::io;
use std::path::Path;

use dirtally_core::Counters;

use crate::router::Shared;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileOp {
    /// File appeared (create or move-in).
    Insert,
    /// File content was written and closed.
    Rewrite,
    /// File disappeared (delete or move-out).
    Remove,
    /// Drops the record of a file that is no longer on disk.
    Forget,
}

impl Shared {
    pub(crate) fn apply_file(&self, path: &Path, op: FileOp) -> Result<()> {
        match op {
            FileOp::Insert => self.insert_file(path, false),
            FileOp::Rewrite => self.insert_file(path, true),
            FileOp::Remove => self.remove_file(path),
            FileOp::Forget => self.forget_file(path),
        }
    }

    /// Whether the size of `file` is counted. Files with no tracked ancestor
    /// are still counted, without size.
    fn counts_size_of(&self, file: &Path) -> bool {
        let Some(parent) = file.parent() else {
            return false;
        };
        match self.table.counts_size_for(parent) {
            Some(counts_size) => counts_size,
            None => {
                tracing::debug!(target = "dirtally.router", path = %file.display(), "file has no tracked ancestor");
                false
            }
        }
    }

    fn insert_file(&self, path: &Path, rewrite: bool) -> Result<()> {
        let counts_size = self.counts_size_of(path);
        if rewrite && !counts_size {
            return Ok(());
        }

        let size = match fs::metadata(path) {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => return Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::trace!(target = "dirtally.router", path = %path.display(), "file vanished before insert");
                return Ok(());
            }
            Err(err) => {
                tracing::debug!(target = "dirtally.router", path = %path.display(), error = %err, "stat failed; dropping insert");
                return Ok(());
            }
        };

        let size = if counts_size { i64::try_from(size).unwrap_or(i64::MAX) } else { 0 };
        let record = Counters::file(size);
        let delta = match self.cache.get(path)? {
            Some(old) => record - old,
            None => record,
        };
        if delta.is_zero() {
            return Ok(());
        }

        self.table.propagate_to_ancestors(path, delta);
        self.cache.put(path, record)?;
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let Some(old) = self.cache.get(path)? else {
            tracing::trace!(target = "dirtally.router", path = %path.display(), "delete of unknown file");
            return Ok(());
        };
        self.table
            .propagate_to_ancestors(path, -Counters::new(1, old.total_bytes));
        self.cache.delete(path)?;
        Ok(())
    }

    fn forget_file(&self, path: &Path) -> Result<()> {
        if fs::metadata(path).is_ok_and(|meta| meta.is_file()) {
            return Ok(());
        }
        tracing::debug!(target = "dirtally.router", path = %path.display(), "dropping record of missing file");
        self.remove_file(path)
    }
}
