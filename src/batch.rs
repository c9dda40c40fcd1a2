//! Atomic multi-key writes: stage a group of puts/deletes, then commit them as one unit.

use std::collections::HashMap;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;

use crate::data::{key_with_seq, LogRecordKind};
use crate::engine::{sync_inner, Engine};
use crate::error::{Error, Result};
use crate::options::WriteBatchOptions;

/// Key carried by the commit marker, seq-prefixed like every other on-disk key.
const TXN_FIN_KEY: &[u8] = b"txn-fin";

/// A group of writes that become visible atomically — either every staged record survives a
/// restart, or none do.
pub struct WriteBatch<'a> {
    engine: &'a Engine,
    options: WriteBatchOptions,
    staged: Mutex<HashMap<Vec<u8>, (Vec<u8>, LogRecordKind)>>,
}

impl<'a> WriteBatch<'a> {
    pub(crate) fn new(engine: &'a Engine, options: WriteBatchOptions) -> Self {
        WriteBatch { engine, options, staged: Mutex::new(HashMap::new()) }
    }

    /// Stages `key -> value`, overwriting any prior staging for the same key.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }
        self.staged.lock().insert(key.to_vec(), (value.to_vec(), LogRecordKind::Normal));
        Ok(())
    }

    /// Stages a delete of `key`. A no-op if the key has no live entry in the engine's index and
    /// nothing is currently staged for it; unstages a pending `put` if the key was never live.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }
        let mut staged = self.staged.lock();
        if self.engine.index.get(key).is_none() {
            if staged.contains_key(key) {
                staged.remove(key);
            }
            return Ok(());
        }
        staged.insert(key.to_vec(), (Vec::new(), LogRecordKind::Tombstone));
        Ok(())
    }

    /// Commits every staged write as a single transaction, identified by one sequence number.
    /// Either all of it becomes visible (now, and after a crash) or, if the commit marker never
    /// reaches disk, none of it does.
    pub fn commit(&self) -> Result<()> {
        let mut staged = self.staged.lock();
        if staged.is_empty() {
            return Ok(());
        }
        if staged.len() > self.options.max_batch_num {
            return Err(Error::ExceedMaxBatchNum);
        }

        let mut inner = self.engine.write_lock();
        let seq = self.engine.next_seq();

        let mut positions = HashMap::with_capacity(staged.len());
        for (key, (value, kind)) in staged.iter() {
            let pos = self.engine.append_log_record(&mut inner, key_with_seq(key, seq), value.clone(), *kind)?;
            positions.insert(key.clone(), pos);
        }

        self.engine.append_log_record(&mut inner, key_with_seq(TXN_FIN_KEY, seq), Vec::new(), LogRecordKind::TxnCommit)?;

        if self.options.sync_writes {
            sync_inner(&inner)?;
        }
        drop(inner);

        for (key, (_, kind)) in staged.iter() {
            match kind {
                LogRecordKind::Normal => {
                    let pos = positions[key];
                    if let Some(old) = self.engine.index.put(key.clone(), pos) {
                        self.engine.reclaimable_size.fetch_add(old.size as u64, Ordering::SeqCst);
                    }
                }
                LogRecordKind::Tombstone => {
                    let pos = positions[key];
                    self.engine.reclaimable_size.fetch_add(pos.size as u64, Ordering::SeqCst);
                    if let (Some(old), _) = self.engine.index.delete(key) {
                        self.engine.reclaimable_size.fetch_add(old.size as u64, Ordering::SeqCst);
                    }
                }
                LogRecordKind::TxnCommit => unreachable!("commit markers are never staged"),
            }
        }

        staged.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::options::Options;
    use tempfile::tempdir;

    fn opts(dir: &std::path::Path) -> Options {
        Options { dirpath: dir.to_path_buf(), data_file_size: 1024 * 1024, ..Options::default() }
    }

    #[test]
    fn commit_applies_every_staged_write_atomically() {
        let dir = tempdir().unwrap();
        let engine = Engine::open(opts(dir.path())).unwrap();

        let batch = engine.new_write_batch(WriteBatchOptions::default());
        batch.put(b"a", b"1").unwrap();
        batch.delete(b"b").unwrap();
        batch.put(b"a", b"2").unwrap();

        // Nothing visible before commit.
        assert!(matches!(engine.get(b"a"), Err(Error::KeyNotFind)));

        batch.commit().unwrap();
        assert_eq!(engine.get(b"a").unwrap(), b"2");
        assert!(matches!(engine.get(b"b"), Err(Error::KeyNotFind)));
        assert_eq!(engine.current_seq(), 1);
    }

    #[test]
    fn uncommitted_batch_is_invisible_even_after_restart() {
        let dir = tempdir().unwrap();
        {
            let engine = Engine::open(opts(dir.path())).unwrap();
            let batch = engine.new_write_batch(WriteBatchOptions::default());
            batch.put(b"never-committed", b"v").unwrap();
        }
        let engine = Engine::open(opts(dir.path())).unwrap();
        assert!(matches!(engine.get(b"never-committed"), Err(Error::KeyNotFind)));
    }

    #[test]
    fn delete_of_never_staged_never_live_key_is_a_noop() {
        let dir = tempdir().unwrap();
        let engine = Engine::open(opts(dir.path())).unwrap();
        let batch = engine.new_write_batch(WriteBatchOptions::default());
        assert!(batch.delete(b"missing").is_ok());
        batch.commit().unwrap();
        assert_eq!(engine.current_seq(), 0);
    }

    #[test]
    fn delete_unstages_a_put_for_a_key_that_was_never_live() {
        let dir = tempdir().unwrap();
        let engine = Engine::open(opts(dir.path())).unwrap();
        let batch = engine.new_write_batch(WriteBatchOptions::default());
        batch.put(b"fresh", b"v").unwrap();
        batch.delete(b"fresh").unwrap();
        batch.commit().unwrap();
        // Nothing was ever staged by the time commit ran.
        assert_eq!(engine.current_seq(), 0);
    }

    #[test]
    fn survives_restart_with_committed_results_identical() {
        let dir = tempdir().unwrap();
        {
            let engine = Engine::open(opts(dir.path())).unwrap();
            let batch = engine.new_write_batch(WriteBatchOptions::default());
            batch.put(b"a", b"1").unwrap();
            batch.delete(b"b").unwrap();
            batch.put(b"a", b"2").unwrap();
            batch.commit().unwrap();
        }
        let engine = Engine::open(opts(dir.path())).unwrap();
        assert_eq!(engine.get(b"a").unwrap(), b"2");
        assert!(matches!(engine.get(b"b"), Err(Error::KeyNotFind)));
        assert_eq!(engine.current_seq(), 1);
    }
}
