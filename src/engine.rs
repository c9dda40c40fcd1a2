//! The core engine: owns the active file, older files, the index, and all open-time recovery.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use fs4::FileExt;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::data::{
    data_file_name, key_with_seq, open_auxiliary_file, parse_data_file_id, parse_key_seq, DataFile, LogRecord,
    LogRecordKind, Position, DATA_FILE_NAME_SUFFIX, FLOCK_FILE_NAME, HINT_FILE_NAME, SEQ_NO_FILE_NAME,
};
use crate::error::{Error, Result};
use crate::index::{self, Indexer};
use crate::io::IoKind;
use crate::options::{check_options, IndexType, Options};

/// Everything the engine lock protects: the active file, sealed older files, and the
/// bytes-written-since-last-sync counter. The index lives outside this lock — see SPEC_FULL.md §5.
pub(crate) struct EngineInner {
    pub(crate) active_file: DataFile,
    pub(crate) older_files: HashMap<u32, DataFile>,
    bytes_since_sync: u64,
}

/// Storage-level statistics returned by [`Engine::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub key_count: usize,
    pub file_count: usize,
    pub deleted_size: u64,
    pub disk_size: u64,
}

/// An open database. Construct with [`Engine::open`]; every call is safe from any thread.
pub struct Engine {
    pub(crate) options: Options,
    pub(crate) inner: RwLock<EngineInner>,
    pub(crate) index: Box<dyn Indexer>,
    pub(crate) seq_no: AtomicU64,
    pub(crate) merging: AtomicBool,
    pub(crate) reclaimable_size: AtomicU64,
    /// Holds the directory's advisory lock for the engine's lifetime; never read directly.
    _lock_file: File,
}

impl Engine {
    /// Opens (creating if necessary) a database at `options.dirpath`.
    pub fn open(options: Options) -> Result<Self> {
        check_options(&options)?;

        let dirpath = options.dirpath.clone();
        fs::create_dir_all(&dirpath)?;

        let lock_file = OpenOptions::new().create(true).write(true).open(dirpath.join(FLOCK_FILE_NAME))?;
        lock_file.try_lock_exclusive().map_err(|_| Error::DataBaseIsUsing)?;

        crate::merge::load_merge_files(&dirpath)?;

        // A disk-resident index never scans the log on open, so mmap acceleration would only buy
        // us a handle we'd immediately have to panic-guard against writes.
        let io_kind =
            if options.mmap_open && options.index_type != IndexType::BPlusTree { IoKind::Mmap } else { IoKind::Buffered };
        let mut file_ids = load_data_file_ids(&dirpath)?;
        let mut data_files = HashMap::new();
        for &id in &file_ids {
            data_files.insert(id, DataFile::open(&dirpath, id, io_kind)?);
        }
        if data_files.is_empty() {
            file_ids.push(0);
            data_files.insert(0, DataFile::open(&dirpath, 0, IoKind::Buffered)?);
        }

        let active_id = *file_ids.last().expect("at least one file id after initialization");
        let active_file = data_files.remove(&active_id).expect("active file id was just inserted");
        let older_files = data_files;

        let index = index::new_indexer(&options, &dirpath)?;
        let mut seq_no = 0u64;
        let mut reclaimable_size = 0u64;

        if options.index_type == IndexType::BPlusTree {
            seq_no = read_seq_no_file(&dirpath)?.unwrap_or(0);
            active_file.set_write_off(active_file.file_size()?);
        } else {
            load_index_from_hint_file(index.as_ref(), &dirpath)?;
            let (max_seq, recovered_reclaimable) =
                load_index_from_data_files(index.as_ref(), &active_file, &older_files, &file_ids)?;
            seq_no = max_seq;
            reclaimable_size = recovered_reclaimable;
            if options.mmap_open {
                active_file.switch_to_buffered_io(&dirpath.join(data_file_name(active_id)))?;
                for (&id, file) in older_files.iter() {
                    file.switch_to_buffered_io(&dirpath.join(data_file_name(id)))?;
                }
            }
        }

        log::info!("opened database at {} ({} live keys)", dirpath.display(), index.size());

        Ok(Engine {
            options,
            inner: RwLock::new(EngineInner { active_file, older_files, bytes_since_sync: 0 }),
            index,
            seq_no: AtomicU64::new(seq_no),
            merging: AtomicBool::new(false),
            reclaimable_size: AtomicU64::new(reclaimable_size),
            _lock_file: lock_file,
        })
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }
        let encoded_key = key_with_seq(key, 0);
        let pos = {
            let mut inner = self.inner.write();
            self.append_log_record(&mut inner, encoded_key, value.to_vec(), LogRecordKind::Normal)?
        };
        if let Some(old) = self.index.put(key.to_vec(), pos) {
            self.reclaimable_size.fetch_add(old.size as u64, Ordering::SeqCst);
        }
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }
        let pos = self.index.get(key).ok_or(Error::KeyNotFind)?;
        self.get_value_by_position(pos)
    }

    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }
        if self.index.get(key).is_none() {
            return Ok(());
        }

        let encoded_key = key_with_seq(key, 0);
        let pos = {
            let mut inner = self.inner.write();
            self.append_log_record(&mut inner, encoded_key, Vec::new(), LogRecordKind::Tombstone)?
        };
        self.reclaimable_size.fetch_add(pos.size as u64, Ordering::SeqCst);

        let (old, existed) = self.index.delete(key);
        if !existed {
            return Err(Error::IndexUpdateFailed);
        }
        if let Some(old) = old {
            self.reclaimable_size.fetch_add(old.size as u64, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Collects every live key in ascending order.
    pub fn list_keys(&self) -> Vec<Vec<u8>> {
        let mut keys = Vec::with_capacity(self.index.size());
        let mut it = self.index.iterator(false);
        it.rewind();
        while it.valid() {
            keys.push(it.key().to_vec());
            it.next();
        }
        keys
    }

    /// Calls `f(key, value)` for every live record in ascending key order, stopping early the
    /// first time `f` returns `false`.
    pub fn fold(&self, mut f: impl FnMut(&[u8], &[u8]) -> Result<bool>) -> Result<()> {
        let mut it = self.index.iterator(false);
        it.rewind();
        while it.valid() {
            let value = self.get_value_by_position(it.value())?;
            if !f(it.key(), &value)? {
                break;
            }
            it.next();
        }
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.inner.write().active_file.sync()
    }

    /// Flushes and closes every open file, persists the sequence number, and releases the
    /// directory lock.
    pub fn close(&self) -> Result<()> {
        let inner = self.inner.write();
        if self.options.index_type == IndexType::BPlusTree {
            write_seq_no_file(&self.options.dirpath, self.seq_no.load(Ordering::SeqCst))?;
        }
        inner.active_file.sync()?;
        inner.active_file.close()?;
        for file in inner.older_files.values() {
            file.close()?;
        }
        self.index.close()?;
        Ok(())
    }

    pub fn stat(&self) -> Result<Stat> {
        let inner = self.inner.read();
        let file_count = inner.older_files.len() + 1;
        let disk_size = fs::read_dir(&self.options.dirpath)?
            .filter_map(|e| e.ok())
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum();
        Ok(Stat {
            key_count: self.index.size(),
            file_count,
            deleted_size: self.reclaimable_size.load(Ordering::SeqCst),
            disk_size,
        })
    }

    /// Recursively copies the database directory to `dest`, excluding the lock file.
    pub fn backup(&self, dest: &Path) -> Result<()> {
        let _inner = self.inner.read();
        fs::create_dir_all(dest)?;
        for entry in fs::read_dir(&self.options.dirpath)? {
            let entry = entry?;
            if entry.file_name() == FLOCK_FILE_NAME {
                continue;
            }
            fs::copy(entry.path(), dest.join(entry.file_name()))?;
        }
        Ok(())
    }

    pub(crate) fn get_value_by_position(&self, pos: Position) -> Result<Vec<u8>> {
        let inner = self.inner.read();
        let record = if pos.file_id == inner.active_file.file_id() {
            inner.active_file.read_record(pos.offset)?
        } else {
            let file = inner.older_files.get(&pos.file_id).ok_or(Error::DataFileNotFound)?;
            file.read_record(pos.offset)?
        };
        let record = record.ok_or(Error::DataDirCorrupted)?.record;
        match record.kind {
            LogRecordKind::Tombstone => Err(Error::KeyNotFind),
            _ => Ok(record.value),
        }
    }

    /// Appends `value` under `encoded_key` (already seq-prefixed), rotating the active file first
    /// if the new record wouldn't fit under `data_file_size`.
    pub(crate) fn append_log_record(
        &self,
        inner: &mut EngineInner,
        encoded_key: Vec<u8>,
        value: Vec<u8>,
        kind: LogRecordKind,
    ) -> Result<Position> {
        let record = LogRecord { key: encoded_key, value, kind };
        let (bytes, size) = record.encode();

        if inner.active_file.write_off() + size as u64 > self.options.data_file_size {
            inner.active_file.sync()?;
            let sealed_id = inner.active_file.file_id();
            let new_file = DataFile::open(&self.options.dirpath, sealed_id + 1, IoKind::Buffered)?;
            let sealed = std::mem::replace(&mut inner.active_file, new_file);
            inner.older_files.insert(sealed_id, sealed);
        }

        let offset_before = inner.active_file.write_off();
        inner.active_file.write(&bytes)?;
        inner.bytes_since_sync += size as u64;

        let should_sync = self.options.sync_writes
            || (self.options.bytes_per_sync > 0 && inner.bytes_since_sync >= self.options.bytes_per_sync);
        if should_sync {
            inner.active_file.sync()?;
            inner.bytes_since_sync = 0;
        }

        Ok(Position { file_id: inner.active_file.file_id(), offset: offset_before, size: size as u32 })
    }

    pub(crate) fn write_lock(&self) -> RwLockWriteGuard<'_, EngineInner> {
        self.inner.write()
    }

    pub(crate) fn read_lock(&self) -> RwLockReadGuard<'_, EngineInner> {
        self.inner.read()
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.seq_no.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn current_seq(&self) -> u64 {
        self.seq_no.load(Ordering::SeqCst)
    }

    /// Starts a new atomic [`crate::WriteBatch`] against this engine.
    pub fn new_write_batch(&self, options: crate::options::WriteBatchOptions) -> crate::batch::WriteBatch<'_> {
        crate::batch::WriteBatch::new(self, options)
    }

    /// Opens an ordered snapshot iterator over the engine's live keys.
    pub fn iterator(&self, options: crate::options::IteratorOptions) -> crate::iterator::Iterator<'_> {
        crate::iterator::Iterator::new(self, options)
    }
}

pub(crate) fn sync_inner(inner: &EngineInner) -> Result<()> {
    inner.active_file.sync()
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::error!("failed to close database cleanly: {err}");
        }
    }
}

fn load_data_file_ids(dirpath: &Path) -> Result<Vec<u32>> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(dirpath)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.ends_with(DATA_FILE_NAME_SUFFIX) {
            continue;
        }
        let id = parse_data_file_id(name).ok_or(Error::DataDirCorrupted)?;
        ids.push(id);
    }
    ids.sort_unstable();
    Ok(ids)
}

fn load_index_from_hint_file(index: &dyn Indexer, dirpath: &Path) -> Result<()> {
    let hint_path = dirpath.join(HINT_FILE_NAME);
    if !hint_path.exists() {
        return Ok(());
    }
    let hint_file = open_auxiliary_file(dirpath, HINT_FILE_NAME)?;
    let mut offset = 0u64;
    while let Some(read) = hint_file.read_record(offset)? {
        let pos = Position::decode(&read.record.value);
        index.put(read.record.key, pos);
        offset += read.size as u64;
    }
    Ok(())
}

/// Rebuilds the index by replaying every data file in ascending id order (SPEC_FULL.md §4.8),
/// staging batched records until their commit marker is seen and silently dropping any that never
/// commit. Returns the highest sequence number observed and the total reclaimable bytes found
/// (every tombstone's own size, plus every position a recovered write or delete displaced) —
/// the same bookkeeping `put`/`delete` perform live, replayed here so `stat().deleted_size` isn't
/// reset to zero by a restart.
fn load_index_from_data_files(
    index: &dyn Indexer,
    active_file: &DataFile,
    older_files: &HashMap<u32, DataFile>,
    file_ids: &[u32],
) -> Result<(u64, u64)> {
    if file_ids.is_empty() {
        return Ok((0, 0));
    }

    let mut max_seq = 0u64;
    let mut reclaimable_size = 0u64;
    let mut staged: HashMap<u64, Vec<(Vec<u8>, LogRecordKind, Position)>> = HashMap::new();
    let mut last_offset = 0u64;

    for &id in file_ids {
        let file: &DataFile = if id == active_file.file_id() { active_file } else { &older_files[&id] };
        let mut offset = 0u64;
        loop {
            let Some(read) = file.read_record(offset)? else { break };
            let size = read.size as u64;
            let record = read.record;
            let pos = Position { file_id: id, offset, size: read.size as u32 };
            let (real_key, seq) = parse_key_seq(&record.key);
            max_seq = max_seq.max(seq);

            if seq == 0 {
                reclaimable_size += apply_recovered_record(index, real_key, record.kind, pos);
            } else if record.kind == LogRecordKind::TxnCommit {
                if let Some(entries) = staged.remove(&seq) {
                    for (key, kind, pos) in entries {
                        reclaimable_size += apply_recovered_record(index, key, kind, pos);
                    }
                }
            } else {
                staged.entry(seq).or_default().push((real_key, record.kind, pos));
            }

            offset += size;
            if id == active_file.file_id() {
                last_offset = offset;
            }
        }
    }

    active_file.set_write_off(last_offset);
    Ok((max_seq, reclaimable_size))
}

/// Applies one recovered record to `index`, returning the number of reclaimable bytes it
/// accounts for: a tombstone's own on-disk size, plus the size of whatever position it or a
/// recovered `put` displaced.
fn apply_recovered_record(index: &dyn Indexer, key: Vec<u8>, kind: LogRecordKind, pos: Position) -> u64 {
    match kind {
        LogRecordKind::Tombstone => {
            let (old, _) = index.delete(&key);
            pos.size as u64 + old.map_or(0, |old| old.size as u64)
        }
        _ => {
            let old = index.put(key, pos);
            old.map_or(0, |old| old.size as u64)
        }
    }
}

fn read_seq_no_file(dirpath: &Path) -> Result<Option<u64>> {
    let path = dirpath.join(SEQ_NO_FILE_NAME);
    if !path.exists() {
        return Ok(None);
    }
    let file = open_auxiliary_file(dirpath, SEQ_NO_FILE_NAME)?;
    let record = file.read_marker()?;
    let text = String::from_utf8(record.value).map_err(|_| Error::DataDirCorrupted)?;
    let seq = text.parse().map_err(|_| Error::DataDirCorrupted)?;
    Ok(Some(seq))
}

pub(crate) fn write_seq_no_file(dirpath: &Path, seq: u64) -> Result<()> {
    let path = dirpath.join(SEQ_NO_FILE_NAME);
    let _ = fs::remove_file(&path);
    let file = open_auxiliary_file(dirpath, SEQ_NO_FILE_NAME)?;
    file.write_marker(b"seq-no", seq.to_string().as_bytes())?;
    file.sync()
}
