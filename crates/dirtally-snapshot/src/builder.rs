use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use dirtally_core::{path_bytes, Counters};
use dirtally_monitor::{MonitorTable, PendingDeletions};

use crate::format::{encode_record, slot_for, DataTrailer, IndexSlot, BUCKETS, INDEX_LEN, MAX_PATH_LEN};
use crate::write::write_atomic;
use crate::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Records written, tombstones included.
    pub records: usize,
    pub tombstones: usize,
    /// Paths too long for a record.
    pub skipped: usize,
    pub buckets_used: usize,
    /// Build time, unix seconds.
    pub timestamp: u64,
    /// Stamp shared by the data file and the index of this build.
    pub generation: u64,
}

static LAST_GENERATION: AtomicU64 = AtomicU64::new(0);

/// Unix time in nanoseconds, bumped so that no two builds in this process
/// share a generation.
fn next_generation() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or_default();
    let mut last = LAST_GENERATION.load(Ordering::Relaxed);
    loop {
        let next = now.max(last.saturating_add(1));
        match LAST_GENERATION.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(current) => last = current,
        }
    }
}

/// Rebuilds the data and index files from the monitor table.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    data_path: PathBuf,
    index_path: PathBuf,
}

struct Record {
    path: Vec<u8>,
    counters: Counters,
}

impl SnapshotBuilder {
    pub fn new(data_path: impl Into<PathBuf>, index_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            index_path: index_path.into(),
        }
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Drains `pending` into tombstones, exports `table` and publishes both.
    ///
    /// On failure the drained deletions are recorded again so the next cycle
    /// still emits them.
    pub fn build(&self, table: &MonitorTable, pending: &PendingDeletions) -> Result<BuildReport> {
        let deleted = pending.drain();
        let tombstones: Vec<PathBuf> = deleted
            .iter()
            .filter(|path| !table.contains(path))
            .cloned()
            .collect();

        match self.build_from(table.export(), &tombstones) {
            Ok(report) => {
                tracing::info!(
                    target = "dirtally.snapshot",
                    records = report.records,
                    tombstones = report.tombstones,
                    skipped = report.skipped,
                    buckets = report.buckets_used,
                    "published snapshot"
                );
                Ok(report)
            }
            Err(err) => {
                for path in &deleted {
                    pending.record(path);
                }
                tracing::warn!(target = "dirtally.snapshot", error = %err, "snapshot build failed");
                Err(err)
            }
        }
    }

    /// Publishes `live` records plus zero-counter tombstones.
    pub fn build_from(&self, live: Vec<(PathBuf, Counters)>, tombstones: &[PathBuf]) -> Result<BuildReport> {
        let generation = next_generation();
        let mut report = BuildReport {
            timestamp: generation / 1_000_000_000,
            generation,
            ..BuildReport::default()
        };

        let mut records = Vec::with_capacity(live.len() + tombstones.len());
        let deleted = tombstones.iter().map(|path| (path.as_path(), Counters::ZERO, true));
        let present = live.iter().map(|(path, counters)| (path.as_path(), *counters, false));
        for (path, counters, tombstone) in deleted.chain(present) {
            let bytes = path_bytes(path);
            if bytes.len() > MAX_PATH_LEN {
                tracing::debug!(target = "dirtally.snapshot", path = %path.display(), "path too long for snapshot");
                report.skipped += 1;
                continue;
            }
            if tombstone {
                report.tombstones += 1;
            }
            records.push(Record {
                path: bytes.to_vec(),
                counters,
            });
        }
        report.records = records.len();

        // Counting sort by slot: sizes, then starting offsets, then scatter.
        let slots: Vec<usize> = records.iter().map(|record| slot_for(&record.path)).collect();
        let mut counts = vec![0u64; BUCKETS];
        for slot in &slots {
            counts[*slot] += 1;
        }
        let mut offsets = vec![0u64; BUCKETS];
        let mut next = 0u64;
        for (slot, count) in counts.iter().enumerate() {
            offsets[slot] = next;
            next += count;
        }
        let mut order = vec![0usize; records.len()];
        let mut cursor = offsets.clone();
        for (idx, slot) in slots.iter().enumerate() {
            order[cursor[*slot] as usize] = idx;
            cursor[*slot] += 1;
        }

        write_atomic(&self.data_path, |file| {
            let mut out = BufWriter::new(file);
            for idx in &order {
                let record = &records[*idx];
                encode_record(&mut out, &record.path, record.counters)?;
            }
            DataTrailer {
                generation,
                records: records.len() as u64,
            }
            .encode(&mut out)?;
            out.flush()
        })?;

        let mut index = Vec::with_capacity(INDEX_LEN);
        for slot in 0..BUCKETS - 1 {
            let entry = IndexSlot {
                offset: offsets[slot],
                count: counts[slot],
                in_use: counts[slot] > 0,
            };
            if entry.in_use {
                report.buckets_used += 1;
            }
            entry.encode(&mut index)?;
        }
        IndexSlot {
            offset: generation,
            count: records.len() as u64,
            in_use: true,
        }
        .encode(&mut index)?;

        write_atomic(&self.index_path, |file| file.write_all(&index))?;
        Ok(report)
    }
}
