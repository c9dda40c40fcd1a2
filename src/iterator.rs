//! An engine-level iterator: wraps an index snapshot iterator, applies prefix filtering, and
//! resolves values by reading through to the data files.

use crate::engine::Engine;
use crate::error::Result;
use crate::index::IndexIterator;
use crate::options::IteratorOptions;

/// Iterates an [`Engine`]'s live keys in order, optionally restricted to a key prefix.
///
/// Takes a snapshot of the index at construction time (or, for the disk-resident index, a
/// consistent read-transaction view); writes made afterwards are not observed.
pub struct Iterator<'a> {
    engine: &'a Engine,
    inner: Box<dyn IndexIterator + 'a>,
    prefix: Vec<u8>,
}

impl<'a> Iterator<'a> {
    pub(crate) fn new(engine: &'a Engine, options: IteratorOptions) -> Self {
        let inner = engine.index.iterator(options.reverse);
        let mut it = Iterator { engine, inner, prefix: options.prefix };
        it.rewind();
        it
    }

    /// Resets the cursor to the first matching key.
    pub fn rewind(&mut self) {
        self.inner.rewind();
        self.skip_to_next();
    }

    /// Repositions the cursor at the first matching key `>= key` (or `<= key` if descending).
    pub fn seek(&mut self, key: &[u8]) {
        self.inner.seek(key);
        self.skip_to_next();
    }

    /// Advances past the current key.
    pub fn next(&mut self) {
        self.inner.next();
        self.skip_to_next();
    }

    /// Whether `key()`/`value()` may currently be called.
    pub fn valid(&self) -> bool {
        self.inner.valid()
    }

    pub fn key(&self) -> &[u8] {
        self.inner.key()
    }

    /// Reads the current entry's value from the underlying data file.
    pub fn value(&self) -> Result<Vec<u8>> {
        self.engine.get_value_by_position(self.inner.value())
    }

    /// Advances past any keys that don't carry `prefix`, mirroring the log-structured original's
    /// `skipToNext` behavior rather than filtering the whole snapshot up front.
    fn skip_to_next(&mut self) {
        if self.prefix.is_empty() {
            return;
        }
        while self.inner.valid() && !self.inner.key().starts_with(&self.prefix) {
            self.inner.next();
        }
    }
}
