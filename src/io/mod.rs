//! Abstract random-access file I/O.
//!
//! Two implementations share the [`IoHandle`] trait: [`file_io::FileIo`] for ordinary buffered
//! file access, and [`mmap_io::MmapIo`] for read-only memory-mapped access used only to speed up
//! the startup index-rebuild scan.

mod file_io;
mod mmap_io;

use std::path::Path;

pub use file_io::FileIo;
pub use mmap_io::MmapIo;

use crate::error::Result;

/// Capability set every data-file-backing I/O object must provide.
///
/// `append`/`sync` are programming errors on a read-only handle (see [`MmapIo`]); callers that
/// might hold either kind of handle must check [`Options::mmap_open`](crate::options::Options)
/// before writing.
pub trait IoHandle: Send + Sync {
    /// Reads into `buf` starting at `offset`, returning the number of bytes read.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>;
    /// Appends `data` to the end of the file, returning the number of bytes written.
    fn append(&self, data: &[u8]) -> Result<usize>;
    /// Flushes any buffered writes and fsyncs the underlying file.
    fn sync(&self) -> Result<()>;
    /// Returns the current size of the file in bytes.
    fn size(&self) -> Result<u64>;
    /// Releases any OS resources held by the handle.
    fn close(&self) -> Result<()>;
}

/// Which kind of [`IoHandle`] a data file should be opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
    /// Ordinary buffered reads/writes through the OS page cache.
    Buffered,
    /// Read-only memory mapping, used only during startup scans.
    Mmap,
}

/// Opens a new I/O handle of the requested kind over `path`, creating the file if necessary.
pub fn open(path: &Path, kind: IoKind) -> Result<Box<dyn IoHandle>> {
    match kind {
        IoKind::Buffered => Ok(Box::new(FileIo::open(path)?)),
        IoKind::Mmap => Ok(Box::new(MmapIo::open(path)?)),
    }
}
