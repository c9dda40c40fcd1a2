use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use parking_lot::Mutex;

use super::IoHandle;
use crate::error::Result;

/// Read-only memory-mapped I/O, used only to speed up the full-file scan that rebuilds the index
/// at startup. `append` and `sync` are programming errors: the engine never holds an `MmapIo`
/// handle past the point where it might need to write (see `Engine::open`, which switches every
/// file back to [`super::FileIo`] once the scan completes).
pub struct MmapIo {
    // `None` for a zero-length file, since `memmap2` refuses to map an empty file.
    mapping: Mutex<Option<Mmap>>,
    len: u64,
}

impl MmapIo {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).or_else(|_| {
            // Mirror FileIo's create-if-missing behaviour so callers can open either kind
            // against a data file that doesn't exist yet.
            std::fs::OpenOptions::new().create(true).read(true).write(true).open(path)
        })?;
        let len = file.metadata()?.len();
        let mapping = if len == 0 {
            None
        } else {
            // Safety: the memory-mapped file is only ever read by this process, and the engine
            // guarantees no other handle concurrently truncates a data file while it is mapped.
            Some(unsafe { Mmap::map(&file)? })
        };
        Ok(MmapIo { mapping: Mutex::new(mapping), len })
    }
}

impl IoHandle for MmapIo {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mapping = self.mapping.lock();
        let Some(mapping) = mapping.as_ref() else {
            return Ok(0);
        };
        let offset = offset as usize;
        if offset >= mapping.len() {
            return Ok(0);
        }
        let end = (offset + buf.len()).min(mapping.len());
        let n = end - offset;
        buf[..n].copy_from_slice(&mapping[offset..end]);
        Ok(n)
    }

    fn append(&self, _data: &[u8]) -> Result<usize> {
        panic!("MmapIo is read-only: append is a programming error")
    }

    fn sync(&self) -> Result<()> {
        panic!("MmapIo is read-only: sync is a programming error")
    }

    fn size(&self) -> Result<u64> {
        Ok(self.len)
    }

    fn close(&self) -> Result<()> {
        *self.mapping.lock() = None;
        Ok(())
    }
}
