//! Externally queryable snapshot of directory aggregates.
//!
//! A snapshot is two files:
//!
//! - a data file of fixed-size records ordered by hash bucket, ending in a
//!   [`DataTrailer`] that stamps the build generation, and
//! - an index file of [`BUCKETS`] slots giving each bucket's first record
//!   and record count, with a trailing slot describing the generation.
//!
//! [`SnapshotBuilder`] publishes the data file first (temp file + rename) and
//! the index only after that succeeds. [`SnapshotReader`] memory-maps both
//! and never takes a lock shared with the writer.

mod builder;
mod format;
mod reader;
mod write;

pub use builder::{BuildReport, SnapshotBuilder};
pub use format::{
    data_len, slot_for, DataTrailer, IndexSlot, BUCKETS, DATA_TRAILER_LEN, INDEX_LEN, MAX_PATH_LEN,
    PATH_FIELD_LEN, RECORD_LEN, SLOT_LEN,
};
pub use reader::{SnapshotInfo, SnapshotLookup, SnapshotReader};

pub type Result<T> = std::result::Result<T, SnapshotError>;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{path}: {reason}")]
    Corrupt {
        path: std::path::PathBuf,
        reason: &'static str,
    },
}
