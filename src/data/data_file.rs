use std::path::Path;

use parking_lot::RwLock;

use super::log_record::{decode_record, header_payload_len, header_signals_eof, MAX_LOG_RECORD_HEADER_SIZE};
use super::{data_file_name, LogRecord, ReadRecord};
use crate::error::{Error, Result};
use crate::io::{self, IoHandle, IoKind};

/// A single numbered append-only log file.
///
/// Only the active file is ever written; older files are opened read-only in practice (nothing
/// enforces this beyond the engine never calling `write` on them again once sealed).
pub struct DataFile {
    file_id: u32,
    write_off: RwLock<u64>,
    io: RwLock<Box<dyn IoHandle>>,
}

impl DataFile {
    /// Opens (or creates) the numbered data file `file_id` in `dirpath`.
    pub fn open(dirpath: &Path, file_id: u32, io_kind: IoKind) -> Result<Self> {
        let path = dirpath.join(data_file_name(file_id));
        Self::open_at(&path, file_id, io_kind)
    }

    /// Opens (or creates) an auxiliary single-purpose file (hint file, merge-finished marker,
    /// seq-no file) that doesn't participate in file-id numbering.
    pub fn open_named(dirpath: &Path, name: &str, file_id: u32) -> Result<Self> {
        Self::open_at(&dirpath.join(name), file_id, IoKind::Buffered)
    }

    fn open_at(path: &Path, file_id: u32, io_kind: IoKind) -> Result<Self> {
        let io = io::open(path, io_kind)?;
        let write_off = io.size()?;
        Ok(DataFile { file_id, write_off: RwLock::new(write_off), io: RwLock::new(io) })
    }

    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    pub fn write_off(&self) -> u64 {
        *self.write_off.read()
    }

    pub fn set_write_off(&self, offset: u64) {
        *self.write_off.write() = offset;
    }

    pub fn file_size(&self) -> Result<u64> {
        self.io.read().size()
    }

    /// Appends `data`, advancing `write_off` by the number of bytes actually written.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        let n = self.io.read().append(data)?;
        *self.write_off.write() += n as u64;
        Ok(n)
    }

    pub fn sync(&self) -> Result<()> {
        self.io.read().sync()
    }

    pub fn close(&self) -> Result<()> {
        self.io.read().close()
    }

    /// Switches this file's I/O handle from memory-mapped to buffered, reopening the same path.
    /// Used once the startup scan (which uses mmap for speed) has finished.
    pub fn switch_to_buffered_io(&self, path: &Path) -> Result<()> {
        let mut io = self.io.write();
        io.close()?;
        *io = io::open(path, IoKind::Buffered)?;
        Ok(())
    }

    /// Reads the record at `offset`, returning the decoded record and its total on-disk length.
    /// Returns `Err(Error::DataDirCorrupted)` mapped to EOF-shaped callers elsewhere; EOF itself
    /// is represented by `Ok(None)`.
    pub fn read_record(&self, offset: u64) -> Result<Option<ReadRecord>> {
        let file_size = self.io.read().size()?;
        if offset >= file_size {
            return Ok(None);
        }

        let header_bytes = (MAX_LOG_RECORD_HEADER_SIZE as u64).min(file_size - offset) as usize;
        let mut header_buf = vec![0u8; header_bytes];
        self.io.read().read_at(&mut header_buf, offset)?;

        if header_signals_eof(&header_buf) {
            return Ok(None);
        }

        let (payload_len, header_len) = header_payload_len(&header_buf);
        if offset + header_len as u64 + payload_len as u64 > file_size {
            // Header is intact but the file ends before the key/value payload does: this is an
            // interrupted trailing write, not corruption, so treat it the same as a truncated
            // header — EOF, not an error.
            return Ok(None);
        }
        let mut kv_buf = vec![0u8; payload_len];
        if payload_len > 0 {
            self.io.read().read_at(&mut kv_buf, offset + header_len as u64)?;
        }

        let (record, size) = decode_record(&header_buf, &kv_buf)?;
        Ok(Some(ReadRecord { record, size }))
    }

    /// Appends a hint record (`real_key`, encoded position) to this file, used only when this
    /// `DataFile` backs a hint file.
    pub fn write_hint_record(&self, real_key: &[u8], pos: &super::Position) -> Result<()> {
        let record = LogRecord { key: real_key.to_vec(), value: pos.encode(), kind: super::LogRecordKind::Normal };
        let (bytes, _) = record.encode();
        self.write(&bytes)?;
        Ok(())
    }

    /// Writes a single-record marker file whose value is `value`'s decimal ASCII, used for the
    /// merge-finished and seq-no files.
    pub fn write_marker(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let record = LogRecord { key: key.to_vec(), value: value.to_vec(), kind: super::LogRecordKind::Normal };
        let (bytes, _) = record.encode();
        self.write(&bytes)?;
        Ok(())
    }

    pub fn read_marker(&self) -> Result<LogRecord> {
        self.read_record(0)?.map(|r| r.record).ok_or(Error::DataDirCorrupted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::LogRecordKind;
    use tempfile::tempdir;

    #[test]
    fn write_and_read_multiple_records() {
        let dir = tempdir().unwrap();
        let file = DataFile::open(dir.path(), 0, IoKind::Buffered).unwrap();

        let records = [
            LogRecord { key: b"key-a".to_vec(), value: b"value-a".to_vec(), kind: LogRecordKind::Normal },
            LogRecord { key: b"key-b".to_vec(), value: b"value-b".to_vec(), kind: LogRecordKind::Normal },
            LogRecord { key: b"key-c".to_vec(), value: vec![], kind: LogRecordKind::Tombstone },
        ];

        let mut offsets = vec![0u64];
        for record in &records {
            let (bytes, len) = record.encode();
            file.write(&bytes).unwrap();
            offsets.push(offsets.last().unwrap() + len as u64);
        }

        for (i, record) in records.iter().enumerate() {
            let read = file.read_record(offsets[i]).unwrap().unwrap();
            assert_eq!(&read.record, record);
        }

        assert!(file.read_record(*offsets.last().unwrap()).unwrap().is_none());
    }

    #[test]
    fn read_past_eof_is_none() {
        let dir = tempdir().unwrap();
        let file = DataFile::open(dir.path(), 0, IoKind::Buffered).unwrap();
        assert!(file.read_record(0).unwrap().is_none());
    }

    #[test]
    fn truncated_trailing_record_is_eof_not_error() {
        let dir = tempdir().unwrap();
        let file = DataFile::open(dir.path(), 0, IoKind::Buffered).unwrap();

        let record = LogRecord { key: b"key".to_vec(), value: b"value".to_vec(), kind: LogRecordKind::Normal };
        let (bytes, len) = record.encode();
        file.write(&bytes[..len - 2]).unwrap();

        assert!(file.read_record(0).unwrap().is_none());
    }
}
