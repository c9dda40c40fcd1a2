//! Engine, write-batch, and iterator configuration.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Which index implementation the engine should use.
///
/// See [`crate::index`] for the tradeoffs of each variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// A single in-memory ordered tree behind one read/write lock.
    Btree,
    /// An in-memory index sharded across `index_num` independently locked partitions.
    Art,
    /// A disk-resident B+-tree that persists the index across restarts.
    BPlusTree,
}

impl Default for IndexType {
    fn default() -> Self {
        IndexType::Btree
    }
}

/// Options controlling how an [`crate::Engine`] is opened.
#[derive(Debug, Clone)]
pub struct Options {
    /// Directory the database lives in. Created if it doesn't exist.
    pub dirpath: PathBuf,
    /// Rotation threshold, in bytes, for the active data file.
    pub data_file_size: u64,
    /// Sync the active file after every append.
    pub sync_writes: bool,
    /// Sync the active file after this many un-synced bytes have been written. `0` disables
    /// byte-count-triggered syncs (only `sync_writes` and explicit `sync()` calls apply).
    pub bytes_per_sync: u64,
    /// Which index implementation to use.
    pub index_type: IndexType,
    /// Shard count for `IndexType::Art`. Ignored by the other index types.
    pub index_num: usize,
    /// Use memory-mapped I/O to accelerate the startup index-rebuild scan.
    pub mmap_open: bool,
    /// Fraction of reclaimable-to-total disk size, in `[0, 1]`, required before `merge` (when
    /// invoked through the ratio-checked path) will proceed.
    pub merge_ratio: f64,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            dirpath: PathBuf::from("/tmp/caskdb"),
            data_file_size: 256 * 1024 * 1024,
            sync_writes: false,
            bytes_per_sync: 0,
            index_type: IndexType::default(),
            index_num: 32,
            mmap_open: false,
            merge_ratio: 0.5,
        }
    }
}

pub(crate) fn check_options(options: &Options) -> Result<()> {
    if options.dirpath.as_os_str().is_empty() {
        return Err(Error::InvalidOptions("dirpath must not be empty"));
    }
    if options.data_file_size == 0 {
        return Err(Error::InvalidOptions("data_file_size must be greater than 0"));
    }
    if !(0.0..=1.0).contains(&options.merge_ratio) {
        return Err(Error::InvalidOptions("merge_ratio must be in [0, 1]"));
    }
    if options.index_type == IndexType::Art && options.index_num == 0 {
        return Err(Error::InvalidOptions("index_num must be greater than 0 for Art"));
    }
    Ok(())
}

/// Options controlling a [`crate::WriteBatch`].
#[derive(Debug, Clone, Copy)]
pub struct WriteBatchOptions {
    /// Maximum number of staged records a single batch may hold.
    pub max_batch_num: usize,
    /// Sync the active file once the batch's commit marker has been written.
    pub sync_writes: bool,
}

impl Default for WriteBatchOptions {
    fn default() -> Self {
        WriteBatchOptions { max_batch_num: 10_000, sync_writes: true }
    }
}

/// Options controlling a [`crate::iterator::Iterator`].
#[derive(Debug, Clone, Default)]
pub struct IteratorOptions {
    /// Only yield keys starting with this prefix. Empty means no filtering.
    pub prefix: Vec<u8>,
    /// Iterate in descending key order instead of ascending.
    pub reverse: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_dirpath() {
        let opts = Options { dirpath: PathBuf::new(), ..Options::default() };
        assert!(matches!(check_options(&opts), Err(Error::InvalidOptions(_))));
    }

    #[test]
    fn rejects_zero_file_size() {
        let opts = Options { data_file_size: 0, ..Options::default() };
        assert!(matches!(check_options(&opts), Err(Error::InvalidOptions(_))));
    }

    #[test]
    fn rejects_merge_ratio_out_of_range() {
        let opts = Options { merge_ratio: 1.5, ..Options::default() };
        assert!(matches!(check_options(&opts), Err(Error::InvalidOptions(_))));
        let opts = Options { merge_ratio: -0.1, ..Options::default() };
        assert!(matches!(check_options(&opts), Err(Error::InvalidOptions(_))));
    }

    #[test]
    fn accepts_defaults() {
        assert!(check_options(&Options::default()).is_ok());
    }
}
