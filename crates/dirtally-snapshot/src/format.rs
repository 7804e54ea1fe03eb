use std::io::{self, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use dirtally_core::{rs_hash, Counters};

/// Bytes reserved for the path at the start of every record.
pub const PATH_FIELD_LEN: usize = 256;

/// Longest path that fits in a record (the field is NUL-padded).
pub const MAX_PATH_LEN: usize = PATH_FIELD_LEN - 1;

pub const RECORD_LEN: usize = PATH_FIELD_LEN + Counters::ENCODED_LEN;

/// Index slots, including the trailing generation slot.
pub const BUCKETS: usize = 10240;

pub const SLOT_LEN: usize = 24;

pub const INDEX_LEN: usize = BUCKETS * SLOT_LEN;

/// Generation stamp appended after the last record of the data file.
pub const DATA_TRAILER_LEN: usize = 16;

/// Expected data file length for `records` records.
pub fn data_len(records: u64) -> u64 {
    records
        .saturating_mul(RECORD_LEN as u64)
        .saturating_add(DATA_TRAILER_LEN as u64)
}

/// Index slot of `path`. The last slot is reserved.
pub fn slot_for(path: &[u8]) -> usize {
    rs_hash(path) as usize % (BUCKETS - 1)
}

/// `offset` and `count` are in records, not bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSlot {
    pub offset: u64,
    pub count: u64,
    pub in_use: bool,
}

impl IndexSlot {
    pub fn encode(&self, out: &mut impl Write) -> io::Result<()> {
        out.write_u64::<LittleEndian>(self.offset)?;
        out.write_u64::<LittleEndian>(self.count)?;
        out.write_u8(u8::from(self.in_use))?;
        out.write_all(&[0u8; 7])
    }

    pub fn decode(mut bytes: &[u8]) -> Option<Self> {
        if bytes.len() < SLOT_LEN {
            return None;
        }
        let offset = bytes.read_u64::<LittleEndian>().ok()?;
        let count = bytes.read_u64::<LittleEndian>().ok()?;
        let in_use = bytes.read_u8().ok()? != 0;
        Some(Self {
            offset,
            count,
            in_use,
        })
    }
}

/// Pairs a data file with the index published by the same build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataTrailer {
    pub generation: u64,
    pub records: u64,
}

impl DataTrailer {
    pub fn encode(&self, out: &mut impl Write) -> io::Result<()> {
        out.write_u64::<LittleEndian>(self.generation)?;
        out.write_u64::<LittleEndian>(self.records)
    }

    pub fn decode(mut bytes: &[u8]) -> Option<Self> {
        if bytes.len() < DATA_TRAILER_LEN {
            return None;
        }
        let generation = bytes.read_u64::<LittleEndian>().ok()?;
        let records = bytes.read_u64::<LittleEndian>().ok()?;
        Some(Self { generation, records })
    }
}

pub(crate) fn encode_record(out: &mut impl Write, path: &[u8], counters: Counters) -> io::Result<()> {
    debug_assert!(path.len() <= MAX_PATH_LEN);
    out.write_all(path)?;
    out.write_all(&[0u8; PATH_FIELD_LEN][..PATH_FIELD_LEN - path.len()])?;
    out.write_i64::<LittleEndian>(counters.file_count)?;
    out.write_i64::<LittleEndian>(counters.total_bytes)
}

/// Splits a record into its path (padding stripped) and counters.
pub(crate) fn decode_record(record: &[u8]) -> Option<(&[u8], Counters)> {
    if record.len() < RECORD_LEN {
        return None;
    }
    let field = &record[..PATH_FIELD_LEN];
    let end = field.iter().position(|byte| *byte == 0).unwrap_or(PATH_FIELD_LEN);
    let counters = Counters::from_le_bytes(&record[PATH_FIELD_LEN..RECORD_LEN])?;
    Some((&field[..end], counters))
}
