//! Compaction: rewrites live records into a sibling `-merge` directory and, on the next `open`,
//! atomically swaps them in for the files they made obsolete.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use crate::data::{
    key_with_seq, parse_data_file_id, parse_key_seq, DataFile, LogRecordKind, FLOCK_FILE_NAME, HINT_FILE_NAME,
    MERGE_FINISHED_FILE_NAME, SEQ_NO_FILE_NAME,
};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::io::IoKind;
use crate::options::{IndexType, Options};

/// Resolves the sibling merge directory for `dirpath` (e.g. `/tmp/caskdb` -> `/tmp/caskdb-merge`).
pub(crate) fn merge_dir_path(dirpath: &Path) -> PathBuf {
    let mut name = dirpath.file_name().unwrap_or_default().to_os_string();
    name.push("-merge");
    dirpath.with_file_name(name)
}

/// Releases the merge flag when a `merge()` call returns, including on early error returns.
struct MergeGuard<'a>(&'a Engine);

impl Drop for MergeGuard<'_> {
    fn drop(&mut self) {
        self.0.merging.store(false, Ordering::SeqCst);
    }
}

impl Engine {
    /// Compacts sealed data files, keeping only records the live index still points at.
    ///
    /// The rewritten files land in a sibling `-merge` directory; they are adopted into the live
    /// directory on the *next* [`Engine::open`], not by this call (see [`load_merge_files`]).
    pub fn merge(&self) -> Result<()> {
        if self.merging.swap(true, Ordering::SeqCst) {
            return Err(Error::MergeIsProgress);
        }
        let _guard = MergeGuard(self);

        let (boundary_id, merge_targets) = {
            let mut inner = self.write_lock();
            inner.active_file.sync()?;
            let sealed_id = inner.active_file.file_id();
            let new_active = DataFile::open(&self.options.dirpath, sealed_id + 1, IoKind::Buffered)?;
            let sealed = std::mem::replace(&mut inner.active_file, new_active);
            inner.older_files.insert(sealed_id, sealed);

            let mut ids: Vec<u32> = inner.older_files.keys().copied().collect();
            ids.sort_unstable();
            (sealed_id + 1, ids)
        };

        if merge_targets.is_empty() {
            return Ok(());
        }

        let merge_dir = merge_dir_path(&self.options.dirpath);
        if merge_dir.exists() {
            fs::remove_dir_all(&merge_dir)?;
        }
        fs::create_dir_all(&merge_dir)?;

        let temp_options = Options {
            dirpath: merge_dir.clone(),
            sync_writes: false,
            index_type: IndexType::Btree,
            ..self.options.clone()
        };
        let temp_engine = Engine::open(temp_options)?;
        let hint_file = DataFile::open_named(&merge_dir, HINT_FILE_NAME, 0)?;

        for &id in &merge_targets {
            let source = DataFile::open(&self.options.dirpath, id, IoKind::Buffered)?;
            let mut offset = 0u64;
            while let Some(read) = source.read_record(offset)? {
                let size = read.size as u64;
                let (real_key, _seq) = parse_key_seq(&read.record.key);

                if let Some(pos) = self.index.get(&real_key) {
                    if pos.file_id == id && pos.offset == offset {
                        let new_pos = {
                            let mut temp_inner = temp_engine.write_lock();
                            temp_engine.append_log_record(
                                &mut temp_inner,
                                key_with_seq(&real_key, 0),
                                read.record.value.clone(),
                                LogRecordKind::Normal,
                            )?
                        };
                        hint_file.write_hint_record(&real_key, &new_pos)?;
                    }
                }
                offset += size;
            }
            source.close()?;
        }

        hint_file.sync()?;
        temp_engine.sync()?;
        drop(temp_engine);

        let marker_file = DataFile::open_named(&merge_dir, MERGE_FINISHED_FILE_NAME, 0)?;
        marker_file.write_marker(b"merge-finished", boundary_id.to_string().as_bytes())?;
        marker_file.sync()?;

        log::info!("merge finished for {}, boundary file id {boundary_id}", self.options.dirpath.display());
        Ok(())
    }

    /// Runs [`Engine::merge`] only if reclaimable space meets `options.merge_ratio` of total disk
    /// usage and there's enough free space on the volume to hold a full rewritten copy.
    pub fn merge_if_needed(&self) -> Result<()> {
        let stat = self.stat()?;
        if stat.disk_size == 0 {
            return Ok(());
        }
        let ratio = stat.deleted_size as f64 / stat.disk_size as f64;
        if ratio < self.options.merge_ratio {
            return Err(Error::NotOverMergeRatio);
        }

        let reclaimable = stat.disk_size - stat.deleted_size;
        let available = fs4::available_space(&self.options.dirpath)?;
        if available < reclaimable {
            return Err(Error::NoEnoughSpaceForMerge);
        }

        self.merge()
    }
}

/// Adopts a completed merge, or discards an incomplete one. Called from [`Engine::open`] before
/// data files are enumerated.
pub(crate) fn load_merge_files(dirpath: &Path) -> Result<()> {
    let merge_dir = merge_dir_path(dirpath);
    if !merge_dir.exists() {
        return Ok(());
    }

    let marker_path = merge_dir.join(MERGE_FINISHED_FILE_NAME);
    if !marker_path.exists() {
        log::warn!("discarding incomplete merge directory {}", merge_dir.display());
        fs::remove_dir_all(&merge_dir)?;
        return Ok(());
    }

    let marker_file = DataFile::open_named(&merge_dir, MERGE_FINISHED_FILE_NAME, 0)?;
    let record = marker_file.read_marker()?;
    marker_file.close()?;
    let boundary_id: u32 =
        String::from_utf8(record.value).map_err(|_| Error::DataDirCorrupted)?.parse().map_err(|_| Error::DataDirCorrupted)?;

    for entry in fs::read_dir(dirpath)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else { continue };
        if let Some(id) = parse_data_file_id(&name) {
            if id < boundary_id {
                fs::remove_file(entry.path())?;
            }
        }
    }

    for entry in fs::read_dir(&merge_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name == MERGE_FINISHED_FILE_NAME || name == FLOCK_FILE_NAME || name == SEQ_NO_FILE_NAME {
            continue;
        }
        fs::rename(entry.path(), dirpath.join(&name))?;
    }
    fs::remove_dir_all(&merge_dir)?;

    log::info!("adopted merge at {}, deleted files below id {boundary_id}", dirpath.display());
    Ok(())
}
