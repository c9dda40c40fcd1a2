use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::{IndexIterator, Indexer, VecIterator};
use crate::data::Position;
use crate::error::Result;

/// The simplest index: a single in-memory ordered tree behind one read/write lock, fully rebuilt
/// from the data files on every `Engine::open`.
pub struct BTreeIndex {
    tree: RwLock<BTreeMap<Vec<u8>, Position>>,
}

impl BTreeIndex {
    pub fn new() -> Self {
        BTreeIndex { tree: RwLock::new(BTreeMap::new()) }
    }
}

impl Indexer for BTreeIndex {
    fn put(&self, key: Vec<u8>, pos: Position) -> Option<Position> {
        self.tree.write().insert(key, pos)
    }

    fn get(&self, key: &[u8]) -> Option<Position> {
        self.tree.read().get(key).copied()
    }

    fn delete(&self, key: &[u8]) -> (Option<Position>, bool) {
        let old = self.tree.write().remove(key);
        let existed = old.is_some();
        (old, existed)
    }

    fn size(&self) -> usize {
        self.tree.read().len()
    }

    fn iterator(&self, reverse: bool) -> Box<dyn IndexIterator> {
        let entries: Vec<_> = self.tree.read().iter().map(|(k, v)| (k.clone(), *v)).collect();
        Box::new(VecIterator::new(entries, reverse))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
