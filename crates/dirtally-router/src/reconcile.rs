use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dirtally_core::{dir_entries, Counters, DirEntryKind};

use crate::files::FileOp;
use crate::router::Shared;
use crate::{Result, ShutdownSignal};

/// Consecutive mismatching checks tolerated before a directory is recounted.
pub const MISMATCH_LIMIT: u32 = 3;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub checked: usize,
    pub mismatched: usize,
    /// Directories recounted after repeated (or forced) mismatches.
    pub corrected: usize,
    /// Tracked directories found missing and dropped.
    pub pruned: usize,
}

impl Shared {
    /// Checks every tracked directory, longest path first. With `force`,
    /// the first mismatch already triggers a recount.
    pub(crate) fn reconcile_once(
        self: &Arc<Self>,
        shutdown: &ShutdownSignal,
        pause: Duration,
        force: bool,
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        for (idx, dir) in self.table.paths_longest_first().into_iter().enumerate() {
            if idx > 0 && !pause.is_zero() {
                if shutdown.wait(pause) {
                    break;
                }
            } else if shutdown.is_triggered() {
                break;
            }
            self.reconcile_dir(&dir, force, &mut report)?;
        }

        if report.mismatched > 0 || report.pruned > 0 {
            tracing::info!(
                target = "dirtally.router",
                checked = report.checked,
                mismatched = report.mismatched,
                corrected = report.corrected,
                pruned = report.pruned,
                "reconciliation pass finished"
            );
        }
        Ok(report)
    }

    fn reconcile_dir(self: &Arc<Self>, dir: &Path, force: bool, report: &mut ReconcileReport) -> Result<()> {
        let Some(entry) = self.table.find(dir) else {
            return Ok(());
        };
        report.checked += 1;

        if !dir.is_dir() {
            self.table.remove(dir);
            if entry.watched {
                self.unwatch(dir);
            }
            self.pending.record(dir);
            self.symlinks.lock().remove(dir);
            self.mismatches.lock().remove(dir);
            report.pruned += 1;
            tracing::info!(target = "dirtally.router", path = %dir.display(), "pruned vanished directory");
            return Ok(());
        }

        let truth = self.ground_truth(dir, entry.counts_size)?;
        if truth == entry.aggregate {
            self.mismatches.lock().remove(dir);
            return Ok(());
        }

        report.mismatched += 1;
        let strikes = {
            let mut mismatches = self.mismatches.lock();
            let strikes = mismatches.entry(dir.to_path_buf()).or_insert(0);
            *strikes += 1;
            *strikes
        };
        tracing::debug!(
            target = "dirtally.router",
            path = %dir.display(),
            strikes,
            expected_files = truth.file_count,
            tracked_files = entry.aggregate.file_count,
            "aggregate mismatch"
        );
        if !force && strikes <= MISMATCH_LIMIT {
            return Ok(());
        }

        self.recount(dir)?;
        report.corrected += 1;
        Ok(())
    }

    /// Drops records of files that left `dir`, re-primes it, waits for the
    /// lanes and applies whatever difference is left to `dir` and its
    /// ancestors.
    fn recount(self: &Arc<Self>, dir: &Path) -> Result<()> {
        let on_disk: HashSet<PathBuf> = dir_entries(dir)?
            .into_iter()
            .filter(|entry| matches!(entry.kind, DirEntryKind::File { .. }))
            .map(|entry| entry.path)
            .collect();
        for key in self.cache.children(dir)? {
            if !on_disk.contains(&key) {
                self.submit_file(key, FileOp::Forget)?;
            }
        }

        self.prime_dir(dir)?;
        self.dispatcher.wait_sharded_idle();
        self.mismatches.lock().remove(dir);

        let Some(entry) = self.table.find(dir) else {
            return Ok(());
        };
        let delta = self.ground_truth(dir, entry.counts_size)? - entry.aggregate;
        if delta.is_zero() {
            return Ok(());
        }

        self.table.apply_delta(dir, delta);
        self.table.propagate_to_ancestors(dir, delta);
        tracing::warn!(
            target = "dirtally.router",
            path = %dir.display(),
            file_count = delta.file_count,
            total_bytes = delta.total_bytes,
            "corrected drifted aggregate"
        );
        Ok(())
    }

    /// Direct files of `dir` plus the aggregates of its tracked child
    /// directories.
    fn ground_truth(&self, dir: &Path, counts_size: bool) -> Result<Counters> {
        let mut truth = Counters::ZERO;
        for entry in dir_entries(dir)? {
            match entry.kind {
                DirEntryKind::File { size } => {
                    let size = if counts_size { i64::try_from(size).unwrap_or(i64::MAX) } else { 0 };
                    truth += Counters::file(size);
                }
                DirEntryKind::Dir | DirEntryKind::SymlinkDir => {
                    if let Some(child) = self.table.find(&entry.path) {
                        truth += child.aggregate;
                    }
                }
            }
        }
        Ok(truth)
    }
}
