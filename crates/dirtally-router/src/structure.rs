use std::path::{Path, PathBuf};
use std::sync::Arc;

use dirtally_core::{dir_entries, DirEntryKind};
use dirtally_scheduler::LaneLayout;
use walkdir::WalkDir;

use crate::router::Shared;
use crate::Result;

fn is_dot_name(entry: &walkdir::DirEntry) -> bool {
    entry.file_name().as_encoded_bytes().first() == Some(&b'.')
}

impl Shared {
    pub(crate) fn watch(&self, path: &Path) {
        match self.watcher.lock().watch_path(path) {
            Ok(()) => {
                self.table.set_watched(path, true);
            }
            Err(err) => {
                tracing::warn!(target = "dirtally.router", path = %path.display(), error = %err, "failed to watch directory");
            }
        }
    }

    pub(crate) fn unwatch(&self, path: &Path) {
        if let Err(err) = self.watcher.lock().unwatch_path(path) {
            tracing::debug!(target = "dirtally.router", path = %path.display(), error = %err, "failed to unwatch directory");
        }
    }

    /// Tracks and watches `root` and every non-excluded subdirectory above
    /// level 1. Returns the directories that were newly tracked.
    pub(crate) fn register_tree(&self, root: &Path, level: Option<u32>, counts_size: Option<bool>) -> Vec<PathBuf> {
        let mut added = Vec::new();
        if self.excludes.is_excluded(root) {
            tracing::debug!(target = "dirtally.router", path = %root.display(), "directory is excluded");
            return added;
        }

        let outcome = self.table.add(root, level, counts_size);
        let Some(entry) = self.table.find(root) else {
            return added;
        };
        if outcome.inserted() {
            self.watch(root);
            added.push(root.to_path_buf());
        }
        if entry.level <= 1 {
            return added;
        }

        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth((entry.level - 1) as usize)
            .follow_links(false)
            .into_iter()
            .filter_entry(|candidate| {
                if is_dot_name(candidate) {
                    return false;
                }
                if self.excludes.is_sub_excluded(root, candidate.path()) {
                    return false;
                }
                if candidate.file_type().is_dir() && self.excludes.is_excluded(candidate.path()) {
                    self.excludes.add_sub_exclusion(root, candidate.path());
                    return false;
                }
                true
            });

        for item in walker {
            let candidate = match item {
                Ok(candidate) => candidate,
                Err(err) => {
                    tracing::debug!(target = "dirtally.router", root = %root.display(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !candidate.file_type().is_dir() {
                continue;
            }
            let child_level = entry.level - candidate.depth() as u32;
            let outcome = self
                .table
                .add(candidate.path(), Some(child_level), Some(entry.counts_size));
            if outcome.inserted() {
                self.watch(candidate.path());
                added.push(candidate.into_path());
            }
        }
        added
    }

    /// Queues an insert for every file directly under `dir`.
    pub(crate) fn prime_dir(self: &Arc<Self>, dir: &Path) -> Result<usize> {
        self.pending.remove(dir);
        let entries = match dir_entries(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };

        let mut queued = 0;
        for entry in entries {
            if let DirEntryKind::File { .. } = entry.kind {
                self.submit_file(entry.path, crate::files::FileOp::Insert)?;
                queued += 1;
            }
        }
        Ok(queued)
    }

    /// Posts a build of `root` to the posted lane: the subtree is registered
    /// and counted once the sharded lanes have drained.
    fn post_build(self: &Arc<Self>, root: &Path) -> Result<()> {
        let shared = Arc::clone(self);
        let root = root.to_path_buf();
        self.dispatcher.submit(LaneLayout::POSTED, move || {
            shared.build_directory(&root)?;
            Ok(())
        })?;
        Ok(())
    }

    fn build_directory(self: &Arc<Self>, root: &Path) -> Result<()> {
        self.dispatcher.wait_sharded_idle();
        self.register_tree(root, None, None);
        let dirs = self.table.subtree(root);
        let mut files = 0;
        for dir in &dirs {
            files += self.prime_dir(dir)?;
        }
        tracing::debug!(target = "dirtally.router", path = %root.display(), dirs = dirs.len(), files, "built directory");
        Ok(())
    }

    /// Tracks `path` with an inferred level and schedules its build.
    fn track_new_dir(self: &Arc<Self>, path: &Path) -> Result<()> {
        let outcome = self.table.add(path, None, None);
        if self.table.find(path).is_none() {
            return Ok(());
        }
        if outcome.inserted() {
            self.watch(path);
            tracing::info!(target = "dirtally.router", path = %path.display(), "tracking new directory");
        }
        self.post_build(path)
    }

    pub(crate) fn dir_created(self: &Arc<Self>, path: &Path) -> Result<()> {
        self.dispatcher.wait_sharded_idle();
        if self.excludes.is_excluded(path) {
            return Ok(());
        }
        self.track_new_dir(path)
    }

    /// A tracked directory was deleted. Its files were already subtracted by
    /// their own delete events.
    pub(crate) fn dir_deleted(&self, path: &Path) {
        self.dispatcher.wait_sharded_idle();
        if let Some(entry) = self.table.remove(path) {
            self.pending.record(path);
            if entry.watched {
                self.unwatch(path);
            }
            tracing::info!(target = "dirtally.router", path = %path.display(), "stopped tracking deleted directory");
        }
        self.mismatches.lock().remove(path);
    }

    /// The watched directory itself went away.
    pub(crate) fn dir_deleted_self(&self, path: &Path) {
        if let Some(entry) = self.table.remove(path) {
            if entry.watched {
                self.unwatch(path);
            }
            tracing::debug!(target = "dirtally.router", path = %path.display(), "watched directory removed itself");
        }
        self.mismatches.lock().remove(path);
    }

    /// A symlink to a directory was removed; the target is untouched.
    pub(crate) fn symlink_dir_deleted(&self, path: &Path) {
        self.unwatch(path);
        tracing::debug!(target = "dirtally.router", path = %path.display(), "directory symlink removed");
    }

    pub(crate) fn dir_moved(self: &Arc<Self>, from: Option<PathBuf>, to: &Path) -> Result<()> {
        let Some(from) = from else {
            tracing::warn!(target = "dirtally.router", path = %to.display(), "directory moved in without a matching move-out; ignoring");
            return Ok(());
        };

        self.dispatcher.wait_sharded_idle();
        let from_excluded = self.excludes.is_excluded(&from);
        let to_excluded = self.excludes.is_excluded(to);
        match (from_excluded, to_excluded) {
            (true, true) => Ok(()),
            (false, false) if self.table.contains(&from) => {
                if self.table.find(to).is_none() && self.table.resolve_level(to) == 0 {
                    self.tear_down_moved(&from, to);
                } else {
                    self.move_tracked(&from, to);
                }
                Ok(())
            }
            (false, true) => {
                self.tear_down_moved(&from, to);
                Ok(())
            }
            (true, false) | (false, false) => self.track_new_dir(to),
        }
    }

    /// Re-keys the tracked subtree at `from` to `to`, carrying its aggregate
    /// and the cache records of its direct files.
    fn move_tracked(&self, from: &Path, to: &Path) {
        let Some(entry) = self.table.find(from) else {
            return;
        };

        self.table.propagate_to_ancestors(from, -entry.aggregate);
        let moved = self.table.rename_prefix(from, to);
        for (old, new) in &moved {
            self.unwatch(old);
            self.watch(new);
            self.migrate_file_records(old, new);
            self.mismatches.lock().remove(old);
        }
        self.table.propagate_to_ancestors(to, entry.aggregate);

        let mut symlinks = self.symlinks.lock();
        if symlinks.remove(from) {
            symlinks.insert(to.to_path_buf());
        }
        drop(symlinks);

        tracing::info!(
            target = "dirtally.router",
            from = %from.display(),
            to = %to.display(),
            dirs = moved.len(),
            "moved tracked directory"
        );
    }

    /// Stops tracking the subtree that left for an excluded or untracked
    /// location.
    fn tear_down_moved(&self, from: &Path, to: &Path) {
        let Some(entry) = self.table.find(from) else {
            return;
        };

        self.table.propagate_to_ancestors(from, -entry.aggregate);
        for path in self.table.subtree(from) {
            let Some(removed) = self.table.remove(&path) else {
                continue;
            };
            if removed.watched {
                self.unwatch(&path);
            }
            self.pending.record(&path);
            self.mismatches.lock().remove(&path);
            if let Ok(rest) = path.strip_prefix(from) {
                self.forget_file_records(&path, &to.join(rest));
            }
        }
        self.symlinks.lock().remove(from);

        tracing::info!(
            target = "dirtally.router",
            from = %from.display(),
            to = %to.display(),
            "directory moved out of tracking"
        );
    }

    /// Moves the cache records of files now listed under `new` from their
    /// keys under `old`.
    fn migrate_file_records(&self, old: &Path, new: &Path) {
        let Ok(entries) = dir_entries(new) else {
            return;
        };
        for entry in entries {
            if !matches!(entry.kind, DirEntryKind::File { .. }) {
                continue;
            }
            let Some(name) = entry.path.file_name() else {
                continue;
            };
            let old_key = old.join(name);
            let moved = self.cache.get(&old_key).and_then(|record| match record {
                Some(record) => {
                    self.cache.delete(&old_key)?;
                    self.cache.put(&entry.path, record)
                }
                None => Ok(()),
            });
            if let Err(err) = moved {
                tracing::warn!(target = "dirtally.router", path = %entry.path.display(), error = %err, "failed to migrate file record");
            }
        }
    }

    /// Drops the cache records kept under `old` for files now in `current`.
    fn forget_file_records(&self, old: &Path, current: &Path) {
        let Ok(entries) = dir_entries(current) else {
            return;
        };
        for entry in entries {
            let Some(name) = entry.path.file_name() else {
                continue;
            };
            if let Err(err) = self.cache.delete(&old.join(name)) {
                tracing::warn!(target = "dirtally.router", path = %entry.path.display(), error = %err, "failed to drop file record");
            }
        }
    }
}
