use std::path::Path;
use std::io::Error as IoError;


/// The kind of filesystem operation which an injected [`Fault`] makes fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// Opening a file for sequential reading.
    OpenRead,
    /// Opening a file for writing.
    OpenWrite,
    /// Writing bytes to an open file.
    Write,
    /// Syncing an open file's data.
    Sync,
    /// Renaming a file; the path matched against is the source path.
    Rename,
    /// Deleting a file.
    Delete,
    /// Syncing a directory; the path matched against is the directory's path.
    SyncDirectory,
}

/// A deterministic failure injected into a [`MemoryFS`], used to test that callers leave
/// persistent state consistent when an I/O error occurs partway through an operation.
///
/// A fault matches an operation if the kinds agree and the file name of the operation's path
/// contains `file_name_contains`. The first `skip` matching operations are allowed to succeed,
/// and every later matching operation fails until the fault is cleared.
///
/// [`MemoryFS`]: super::MemoryFS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub kind:               FaultKind,
    pub file_name_contains: String,
    pub skip:               u32,
}

impl Fault {
    #[inline]
    #[must_use]
    pub fn new(kind: FaultKind, file_name_contains: impl Into<String>) -> Self {
        Self {
            kind,
            file_name_contains: file_name_contains.into(),
            skip:               0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn after(mut self, skip: u32) -> Self {
        self.skip = skip;
        self
    }

    /// Returns an error if this fault fires for the given operation, and records the match
    /// otherwise.
    pub(super) fn check(&mut self, kind: FaultKind, path: &Path) -> Result<(), IoError> {
        if kind != self.kind {
            return Ok(());
        }

        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.contains(&self.file_name_contains));

        if !matches {
            Ok(())
        } else if let Some(remaining) = self.skip.checked_sub(1) {
            self.skip = remaining;
            Ok(())
        } else {
            Err(IoError::other(format!(
                "injected {kind:?} fault on {}",
                path.display(),
            )))
        }
    }
}
