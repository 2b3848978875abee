use std::{path::PathBuf, sync::Arc};
use std::io::{Result as IoResult, Write};

use parking_lot::Mutex;

use crate::util_traits::WritableFile;
use super::{fault::FaultKind, fs::FsState};


pub(super) type SharedBuffer = Arc<Mutex<Vec<u8>>>;

/// A writable handle to a file in a [`MemoryFS`].
///
/// Like a file descriptor on Unix, the handle refers to the file's contents rather than its path:
/// writes through a handle whose file was renamed or deleted still go to the same buffer.
///
/// [`MemoryFS`]: super::MemoryFS
#[derive(Debug)]
pub struct MemoryFile {
    path:   PathBuf,
    buffer: SharedBuffer,
    state:  Arc<Mutex<FsState>>,
}

impl MemoryFile {
    #[inline]
    #[must_use]
    pub(super) const fn new(
        path:   PathBuf,
        buffer: SharedBuffer,
        state:  Arc<Mutex<FsState>>,
    ) -> Self {
        Self { path, buffer, state }
    }

    fn check_fault(&self, kind: FaultKind) -> IoResult<()> {
        self.state.lock().check_faults(kind, &self.path)
    }
}

impl Write for MemoryFile {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.check_fault(FaultKind::Write)?;
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    #[inline]
    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

impl WritableFile for MemoryFile {
    #[inline]
    fn sync_data(&mut self) -> IoResult<()> {
        self.check_fault(FaultKind::Sync)
    }
}
