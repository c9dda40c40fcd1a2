use std::fmt::Display;
use std::path::Path;

use jammdb::DB;

use super::{IndexIterator, Indexer, VecIterator};
use crate::data::Position;
use crate::error::{Error, Result};

const BUCKET_NAME: &[u8] = b"caskdb-index";
const INDEX_FILE_NAME: &str = "bptree-index";

fn backend_err(err: impl Display) -> Error {
    Error::IndexBackendFailed(err.to_string())
}

/// The disk-resident index: a transactional B+-tree backed by `jammdb`, persisting across
/// restarts instead of being rebuilt by a startup scan. Every read and write goes through its own
/// transaction, so this index's durability is independent of the log file's.
pub struct BPlusTreeIndex {
    db: DB,
}

impl BPlusTreeIndex {
    /// Opens (creating if absent) the B+-tree file under `dirpath`.
    pub fn open(dirpath: &Path) -> Result<Self> {
        let db = DB::open(dirpath.join(INDEX_FILE_NAME)).map_err(backend_err)?;
        {
            let tx = db.tx(true).map_err(backend_err)?;
            tx.get_or_create_bucket(BUCKET_NAME).map_err(backend_err)?;
            tx.commit().map_err(backend_err)?;
        }
        Ok(BPlusTreeIndex { db })
    }
}

impl Indexer for BPlusTreeIndex {
    fn put(&self, key: Vec<u8>, pos: Position) -> Option<Position> {
        let tx = self.db.tx(true).ok()?;
        let bucket = tx.get_or_create_bucket(BUCKET_NAME).ok()?;
        let old = bucket.get(&key).map(|data| Position::decode(data.kv().value()));
        bucket.put(key, pos.encode()).ok()?;
        tx.commit().ok()?;
        old
    }

    fn get(&self, key: &[u8]) -> Option<Position> {
        let tx = self.db.tx(false).ok()?;
        let bucket = tx.get_bucket(BUCKET_NAME).ok()?;
        bucket.get(key).map(|data| Position::decode(data.kv().value()))
    }

    fn delete(&self, key: &[u8]) -> (Option<Position>, bool) {
        let Ok(tx) = self.db.tx(true) else { return (None, false) };
        let Ok(bucket) = tx.get_or_create_bucket(BUCKET_NAME) else { return (None, false) };
        let old = bucket.get(key).map(|data| Position::decode(data.kv().value()));
        let existed = old.is_some();
        if existed {
            let _ = bucket.delete(key);
            let _ = tx.commit();
        }
        (old, existed)
    }

    fn size(&self) -> usize {
        let Ok(tx) = self.db.tx(false) else { return 0 };
        let Ok(bucket) = tx.get_bucket(BUCKET_NAME) else { return 0 };
        bucket.kv_pairs().count()
    }

    fn iterator(&self, reverse: bool) -> Box<dyn IndexIterator> {
        // Unlike the in-memory indexes, the tree itself is already ordered; the cursor walk below
        // only needs to snapshot it, not sort it. The read transaction closes at the end of this
        // scope, matching the in-memory indexes' snapshot-not-live semantics.
        let mut entries = Vec::new();
        if let Ok(tx) = self.db.tx(false) {
            if let Ok(bucket) = tx.get_bucket(BUCKET_NAME) {
                for data in bucket.kv_pairs() {
                    entries.push((data.key().to_vec(), Position::decode(data.value())));
                }
            }
        }
        if reverse {
            entries.reverse();
        }
        Box::new(VecIterator::from_sorted(entries, reverse))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn pos(offset: u64) -> Position {
        Position { file_id: 0, offset, size: 1 }
    }

    #[test]
    fn put_get_delete_roundtrip() {
        let dir = tempdir().unwrap();
        let idx = BPlusTreeIndex::open(dir.path()).unwrap();

        assert_eq!(idx.put(b"k".to_vec(), pos(1)), None);
        assert_eq!(idx.get(b"k"), Some(pos(1)));
        assert_eq!(idx.put(b"k".to_vec(), pos(2)), Some(pos(1)));
        assert_eq!(idx.delete(b"k"), (Some(pos(2)), true));
        assert_eq!(idx.get(b"k"), None);
        assert_eq!(idx.delete(b"k"), (None, false));
    }

    #[test]
    fn survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let idx = BPlusTreeIndex::open(dir.path()).unwrap();
            idx.put(b"persisted".to_vec(), pos(7));
        }
        let idx = BPlusTreeIndex::open(dir.path()).unwrap();
        assert_eq!(idx.get(b"persisted"), Some(pos(7)));
    }

    #[test]
    fn iterator_is_ordered() {
        let dir = tempdir().unwrap();
        let idx = BPlusTreeIndex::open(dir.path()).unwrap();
        idx.put(b"c".to_vec(), pos(3));
        idx.put(b"a".to_vec(), pos(1));
        idx.put(b"b".to_vec(), pos(2));

        let mut it = idx.iterator(false);
        it.rewind();
        let mut keys = Vec::new();
        while it.valid() {
            keys.push(it.key().to_vec());
            it.next();
        }
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }
}
