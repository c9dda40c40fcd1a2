//! The in-memory/disk-resident `key -> Position` index and its three interchangeable
//! implementations.

mod bptree;
mod btree;
mod sharded;

use std::path::Path;

use crate::data::Position;
use crate::error::Result;
use crate::options::{IndexType, Options};

pub use bptree::BPlusTreeIndex;
pub use btree::BTreeIndex;
pub use sharded::ShardedIndex;

/// `key -> Position` mapping, with independent internal synchronization so index calls never
/// block on the engine's own lock (see SPEC_FULL.md §5).
pub trait Indexer: Send + Sync {
    /// Inserts or replaces the position for `key`, returning the position it displaced, if any.
    fn put(&self, key: Vec<u8>, pos: Position) -> Option<Position>;
    /// Looks up the current position for `key`.
    fn get(&self, key: &[u8]) -> Option<Position>;
    /// Removes `key`, returning `(displaced_position, was_present)`.
    fn delete(&self, key: &[u8]) -> (Option<Position>, bool);
    /// Number of live keys.
    fn size(&self) -> usize;
    /// A byte-lexicographically ordered (or, if `reverse`, descending) snapshot iterator.
    fn iterator(&self, reverse: bool) -> Box<dyn IndexIterator>;
    /// Releases any resources (file handles, transactions) the index holds.
    fn close(&self) -> Result<()>;
}

/// Iterates an [`Indexer`]'s entries in key order.
///
/// `rewind`/`seek` reposition the cursor; `valid` reports whether `key`/`value` may be called.
/// On an empty index, `valid()` is `false` immediately after `rewind`.
pub trait IndexIterator {
    fn rewind(&mut self);
    /// Seeks to the first key `>= key` (ascending iterators) or `<= key` (descending iterators).
    fn seek(&mut self, key: &[u8]);
    fn next(&mut self);
    fn valid(&self) -> bool;
    fn key(&self) -> &[u8];
    fn value(&self) -> Position;
}

/// Constructs the index implementation named by `options.index_type`.
pub fn new_indexer(options: &Options, dirpath: &Path) -> Result<Box<dyn Indexer>> {
    Ok(match options.index_type {
        IndexType::Btree => Box::new(BTreeIndex::new()),
        IndexType::Art => Box::new(ShardedIndex::new(options.index_num)),
        IndexType::BPlusTree => Box::new(BPlusTreeIndex::open(dirpath)?),
    })
}

/// Buffers an index snapshot into a sorted `Vec`, the shared backbone of the in-memory iterators
/// ([`btree::BTreeIterator`] and [`sharded::ShardedIterator`]'s k-way merge output).
pub(crate) struct VecIterator {
    entries: Vec<(Vec<u8>, Position)>,
    cursor: usize,
    reverse: bool,
}

impl VecIterator {
    fn new(mut entries: Vec<(Vec<u8>, Position)>, reverse: bool) -> Self {
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        if reverse {
            entries.reverse();
        }
        VecIterator { entries, cursor: 0, reverse }
    }

    /// Builds an iterator from `entries` that are already in the iteration order the caller
    /// wants (ascending if `!reverse`, descending if `reverse`) — used by [`sharded::ShardedIndex`]
    /// to avoid re-sorting output that its k-way merge already produced in order.
    pub(crate) fn from_sorted(entries: Vec<(Vec<u8>, Position)>, reverse: bool) -> Self {
        VecIterator { entries, cursor: 0, reverse }
    }
}

impl IndexIterator for VecIterator {
    fn rewind(&mut self) {
        self.cursor = 0;
    }

    fn seek(&mut self, key: &[u8]) {
        // Ascending iterators seek to the first key >= `key`; descending iterators seek to the
        // first key <= `key`, which — since `entries` is already reversed for them — is simply
        // the first entry not greater than `key` when scanned front-to-back.
        self.cursor = if self.reverse {
            self.entries.partition_point(|(k, _)| k.as_slice() > key)
        } else {
            self.entries.partition_point(|(k, _)| k.as_slice() < key)
        };
    }

    fn next(&mut self) {
        self.cursor += 1;
    }

    fn valid(&self) -> bool {
        self.cursor < self.entries.len()
    }

    fn key(&self) -> &[u8] {
        &self.entries[self.cursor].0
    }

    fn value(&self) -> Position {
        self.entries[self.cursor].1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(offset: u64) -> Position {
        Position { file_id: 0, offset, size: 1 }
    }

    #[test]
    fn vec_iterator_ascending_order_and_seek() {
        let entries = vec![(b"b".to_vec(), pos(2)), (b"a".to_vec(), pos(1)), (b"c".to_vec(), pos(3))];
        let mut it = VecIterator::new(entries, false);
        it.rewind();
        let mut keys = Vec::new();
        while it.valid() {
            keys.push(it.key().to_vec());
            it.next();
        }
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);

        it.rewind();
        it.seek(b"b");
        assert_eq!(it.key(), b"b");
    }

    #[test]
    fn vec_iterator_descending_order_and_seek() {
        let entries = vec![(b"b".to_vec(), pos(2)), (b"a".to_vec(), pos(1)), (b"c".to_vec(), pos(3))];
        let mut it = VecIterator::new(entries, true);
        it.rewind();
        let mut keys = Vec::new();
        while it.valid() {
            keys.push(it.key().to_vec());
            it.next();
        }
        assert_eq!(keys, vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);

        it.rewind();
        it.seek(b"b");
        assert_eq!(it.key(), b"b");
    }

    #[test]
    fn empty_iterator_is_never_valid() {
        let mut it = VecIterator::new(Vec::new(), false);
        it.rewind();
        assert!(!it.valid());
    }
}
