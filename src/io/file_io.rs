use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;

use parking_lot::Mutex;

use super::IoHandle;
use crate::error::Result;

/// Standard buffered file I/O, opened in append mode so concurrent `append` calls always land at
/// the current end of file regardless of interleaving.
///
/// Reads use positional `pread` (`FileExt::read_at`) against a shared `&File` and therefore need
/// no lock — sealed/older files may be read concurrently with each other and with this file's own
/// writer. Only `append` takes the mutex, to serialize `write_all`'s own multi-syscall loop so two
/// concurrent appenders can't interleave their writes.
pub struct FileIo {
    file: File,
    append_lock: Mutex<()>,
}

impl FileIo {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).read(true).append(true).open(path)?;
        Ok(FileIo { file, append_lock: Mutex::new(()) })
    }
}

impl IoHandle for FileIo {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        Ok(self.file.read_at(buf, offset)?)
    }

    fn append(&self, data: &[u8]) -> Result<usize> {
        use std::io::Write;
        let _guard = self.append_lock.lock();
        (&self.file).write_all(data)?;
        Ok(data.len())
    }

    fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
