//! On-disk record format and the data files that store it.

mod data_file;
mod log_record;

pub use data_file::DataFile;
pub use log_record::{decode_varint, encode_varint, key_with_seq, parse_key_seq, LogRecord, LogRecordKind, ReadRecord};

use crate::error::Result;

/// Suffix every numbered data file carries.
pub const DATA_FILE_NAME_SUFFIX: &str = ".data";
/// Hint file name, written by merge to speed up recovery.
pub const HINT_FILE_NAME: &str = "hint-index";
/// Marker file name, written in the `-merge` directory once a merge has completed.
pub const MERGE_FINISHED_FILE_NAME: &str = "merge-finished";
/// File holding the last persisted transaction sequence number (disk-resident index only).
pub const SEQ_NO_FILE_NAME: &str = "seq-no";
/// Zero-byte file used only to take an OS-level advisory lock on the database directory.
pub const FLOCK_FILE_NAME: &str = "flock";

/// Describes where a record lives on disk: which file, what offset, and how many bytes it
/// occupies (the last field is used only for reclaimable-space accounting, never for reads).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub file_id: u32,
    pub offset: u64,
    pub size: u32,
}

impl Position {
    /// Encodes `(file_id, offset)` as two varints, for storage in a hint file. `size` is not
    /// persisted: a position loaded from a hint file carries `size: 0`, since hint-derived
    /// positions are only ever used to serve reads, never to account reclaimable bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(10);
        encode_varint(self.file_id as u64, &mut out);
        encode_varint(self.offset, &mut out);
        out
    }

    pub fn decode(bytes: &[u8]) -> Position {
        let (file_id, n) = decode_varint(bytes).unwrap_or((0, 0));
        let (offset, _) = decode_varint(&bytes[n..]).unwrap_or((0, 0));
        Position { file_id: file_id as u32, offset, size: 0 }
    }
}

/// Returns the expected file name (not the full path) for data file `file_id`.
pub fn data_file_name(file_id: u32) -> String {
    format!("{file_id:09}{DATA_FILE_NAME_SUFFIX}")
}

/// Parses a `*.data` file name (without directory) back into its file id, returning `None` if the
/// name isn't a well-formed data file name.
pub fn parse_data_file_id(name: &str) -> Option<u32> {
    let stem = name.strip_suffix(DATA_FILE_NAME_SUFFIX)?;
    stem.parse().ok()
}

pub(crate) fn open_auxiliary_file(dirpath: &std::path::Path, name: &str) -> Result<DataFile> {
    DataFile::open_named(dirpath, name, 0)
}
