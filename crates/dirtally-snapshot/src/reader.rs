use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use dirtally_core::{path_bytes, Counters};
use memmap2::{Mmap, MmapOptions};

use crate::format::{
    data_len, decode_record, slot_for, DataTrailer, IndexSlot, BUCKETS, DATA_TRAILER_LEN, INDEX_LEN,
    RECORD_LEN, SLOT_LEN,
};
use crate::{Result, SnapshotError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotLookup {
    Found(Counters),
    /// The path's bucket was scanned without an exact match.
    NotFound,
    /// No snapshot covers the path yet; ask again after the next build.
    NotYetKnown,
}

/// Generation metadata from the trailing index slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotInfo {
    /// Build time in unix nanoseconds; unique per build.
    pub generation: u64,
    pub records: u64,
}

impl SnapshotInfo {
    /// Build time, unix seconds.
    pub fn timestamp(&self) -> u64 {
        self.generation / 1_000_000_000
    }
}

struct Mapped {
    index: Mmap,
    data: Mmap,
    info: SnapshotInfo,
}

/// Read-only view of a published snapshot.
///
/// The files are mapped at [`SnapshotReader::open`] / [`SnapshotReader::refresh`];
/// later rebuilds replace them by rename, so a reader keeps seeing the
/// generation it mapped until it refreshes.
pub struct SnapshotReader {
    data_path: PathBuf,
    index_path: PathBuf,
    mapped: Option<Mapped>,
}

impl std::fmt::Debug for SnapshotReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotReader")
            .field("data_path", &self.data_path)
            .field("index_path", &self.index_path)
            .field("info", &self.info())
            .finish()
    }
}

impl SnapshotReader {
    pub fn open(data_path: impl Into<PathBuf>, index_path: impl Into<PathBuf>) -> Result<Self> {
        let mut reader = Self {
            data_path: data_path.into(),
            index_path: index_path.into(),
            mapped: None,
        };
        reader.refresh()?;
        Ok(reader)
    }

    /// Re-maps the currently published files. A missing index or a data file
    /// from another generation leaves the reader unmapped.
    pub fn refresh(&mut self) -> Result<()> {
        self.mapped = None;

        let index_file = match File::open(&self.index_path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        if index_file.metadata()?.len() != INDEX_LEN as u64 {
            return Err(SnapshotError::Corrupt {
                path: self.index_path.clone(),
                reason: "unexpected index length",
            });
        }
        let index = unsafe { MmapOptions::new().map(&index_file) }?;

        let trailer = IndexSlot::decode(&index[(BUCKETS - 1) * SLOT_LEN..]).ok_or_else(|| {
            SnapshotError::Corrupt {
                path: self.index_path.clone(),
                reason: "truncated generation slot",
            }
        })?;
        if !trailer.in_use {
            return Ok(());
        }
        let info = SnapshotInfo {
            generation: trailer.offset,
            records: trailer.count,
        };

        let data_file = match File::open(&self.data_path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        if data_file.metadata()?.len() != data_len(info.records) {
            tracing::debug!(target = "dirtally.snapshot", records = info.records, "data file length does not match index");
            return Ok(());
        }
        let data = unsafe { MmapOptions::new().map(&data_file) }?;
        let stamped = DataTrailer::decode(&data[data.len() - DATA_TRAILER_LEN..]);
        let expected = DataTrailer {
            generation: info.generation,
            records: info.records,
        };
        if stamped != Some(expected) {
            tracing::debug!(
                target = "dirtally.snapshot",
                generation = info.generation,
                "data file belongs to another generation"
            );
            return Ok(());
        }

        self.mapped = Some(Mapped { index, data, info });
        Ok(())
    }

    pub fn info(&self) -> Option<SnapshotInfo> {
        self.mapped.as_ref().map(|mapped| mapped.info)
    }

    pub fn lookup(&self, path: &Path) -> SnapshotLookup {
        let Some(mapped) = &self.mapped else {
            return SnapshotLookup::NotYetKnown;
        };
        let key = path_bytes(path);
        let slot_offset = slot_for(key) * SLOT_LEN;
        let Some(slot) = IndexSlot::decode(&mapped.index[slot_offset..slot_offset + SLOT_LEN]) else {
            return SnapshotLookup::NotYetKnown;
        };
        if !slot.in_use || slot.count == 0 {
            return SnapshotLookup::NotYetKnown;
        }
        let data = &mapped.data[..mapped.data.len() - DATA_TRAILER_LEN];
        let start = slot.offset as usize * RECORD_LEN;
        let end = start + slot.count as usize * RECORD_LEN;
        let Some(bucket) = data.get(start..end) else {
            return SnapshotLookup::NotYetKnown;
        };
        for record in bucket.chunks_exact(RECORD_LEN) {
            if let Some((record_path, counters)) = decode_record(record) {
                if record_path == key {
                    return SnapshotLookup::Found(counters);
                }
            }
        }
        SnapshotLookup::NotFound
    }
}
