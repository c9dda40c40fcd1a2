//! Crate-wide error type.
//!
//! Kept dependency-free (no derive-macro error crate) the same way the storage layer this crate
//! grew out of kept its own `crate::error` free of extra dependencies: every fallible API in this
//! crate returns the same [`Error`] enum through the [`Result`] alias.

use std::fmt;
use std::io;

/// Errors produced by the storage engine.
#[derive(Debug)]
pub enum Error {
    /// An empty key was passed to `put`, `delete`, or `get`.
    KeyIsEmpty,
    /// No live record exists for the requested key.
    KeyNotFind,
    /// The in-memory index rejected an update that was expected to succeed.
    IndexUpdateFailed,
    /// A [`crate::data::Position`] referenced a file id that isn't open.
    DataFileNotFound,
    /// The database directory contains a file that isn't a valid data file, or a scan
    /// encountered corruption severe enough to abort recovery.
    DataDirCorrupted,
    /// A record's stored CRC32 didn't match the recomputed CRC32.
    InvalidCrc,
    /// A write batch staged more records than `WriteBatchOptions::max_batch_num`.
    ExceedMaxBatchNum,
    /// `merge` was called while another merge was already running.
    MergeIsProgress,
    /// The database directory is locked by another process.
    DataBaseIsUsing,
    /// `merge` was refused because reclaimable space is below `Options::merge_ratio`.
    NotOverMergeRatio,
    /// `merge` was refused because there isn't enough free disk space to hold a rewritten copy.
    NoEnoughSpaceForMerge,
    /// A configuration option failed validation.
    InvalidOptions(&'static str),
    /// A low-level I/O error.
    Io(io::Error),
    /// The disk-resident B+-tree index backend reported a failure.
    IndexBackendFailed(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::KeyIsEmpty => write!(f, "key is empty"),
            Error::KeyNotFind => write!(f, "key not found"),
            Error::IndexUpdateFailed => write!(f, "failed to update index"),
            Error::DataFileNotFound => write!(f, "data file not found"),
            Error::DataDirCorrupted => write!(f, "the database directory may be corrupted"),
            Error::InvalidCrc => write!(f, "invalid crc, log record may be corrupted"),
            Error::ExceedMaxBatchNum => write!(f, "exceed max batch num"),
            Error::MergeIsProgress => write!(f, "merge is already in progress"),
            Error::DataBaseIsUsing => write!(f, "database directory is already in use"),
            Error::NotOverMergeRatio => write!(f, "reclaimable ratio below merge threshold"),
            Error::NoEnoughSpaceForMerge => write!(f, "not enough disk space to run merge"),
            Error::InvalidOptions(msg) => write!(f, "invalid options: {msg}"),
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::IndexBackendFailed(msg) => write!(f, "index backend error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_non_empty_for_every_variant() {
        let variants = [
            Error::KeyIsEmpty,
            Error::KeyNotFind,
            Error::IndexUpdateFailed,
            Error::DataFileNotFound,
            Error::DataDirCorrupted,
            Error::InvalidCrc,
            Error::ExceedMaxBatchNum,
            Error::MergeIsProgress,
            Error::DataBaseIsUsing,
            Error::NotOverMergeRatio,
            Error::NoEnoughSpaceForMerge,
            Error::InvalidOptions("dirpath"),
            Error::Io(io::Error::new(io::ErrorKind::Other, "boom")),
            Error::IndexBackendFailed("boom".to_string()),
        ];
        for err in variants {
            assert!(!err.to_string().is_empty());
        }
    }
}
