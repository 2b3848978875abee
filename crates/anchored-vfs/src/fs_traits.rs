use std::io::Read;
use std::path::{Path, PathBuf};

use crate::util_traits::{FSError, FSLockError, WritableFile};


// ================================================================
//  Main filesystem traits
// ================================================================

/// The read-only half of a filesystem holding database directories.
pub trait ReadableFilesystem {
    /// Read front to back, as when replaying a manifest or loading a table file.
    type ReadFile:          Read;
    type Error:             FSError;
    /// The names of the entries of a directory, relative to that directory.
    type DirectoryChildren: IntoIterator<Item = Result<PathBuf, Self::Error>>;
    /// An exclusively locked file, such as the `LOCK` file of a database directory.
    ///
    /// Not [`Clone`], since unlocking consumes it.
    type Lockfile;
    type LockError:         FSLockError;

    /// See [`File::open`].
    ///
    /// [`File::open`]: std::fs::File::open
    fn open_sequential(&self, path: &Path) -> Result<Self::ReadFile, Self::Error>;

    /// Whether a file or directory exists at `path`. See [`fs::exists`].
    ///
    /// [`fs::exists`]: std::fs::exists
    fn exists(&self, path: &Path) -> Result<bool, Self::Error>;

    /// List the entries directly inside the directory at `path`, as paths relative to it.
    fn children(&self, path: &Path) -> Result<Self::DirectoryChildren, Self::Error>;

    /// The length in bytes of the file at `path`.
    fn size_of(&self, path: &Path) -> Result<u64, Self::Error>;

    /// Release a lock taken by [`WritableFilesystem::create_and_lock`]. The file is kept.
    fn unlock_and_close(&self, lockfile: Self::Lockfile) -> Result<(), Self::LockError>;
}

/// A filesystem which table files, manifests, and `CURRENT` can be written to.
pub trait WritableFilesystem: ReadableFilesystem {
    type WriteFile: WritableFile;

    /// Create the file at `path`, truncating any previous contents. With `create_dir`, missing
    /// parent directories are created too.
    fn open_writable(
        &self,
        path:       &Path,
        create_dir: bool,
    ) -> Result<Self::WriteFile, Self::Error>;

    fn delete(&self, path: &Path) -> Result<(), Self::Error>;

    fn create_dir_all(&self, path: &Path) -> Result<(), Self::Error>;

    /// Move `old` to `new`, replacing any file at `new`.
    ///
    /// `CURRENT` is only ever switched with this method, so readers of `new` must see either
    /// the whole old file or the whole new one.
    fn rename(&self, old: &Path, new: &Path) -> Result<(), Self::Error>;

    /// Make renames and new entries in the directory at `path` durable. May do nothing on
    /// filesystems that are not persistent.
    fn sync_directory(&self, path: &Path) -> Result<(), Self::Error>;

    /// Open or create the file at `path`, and lock it exclusively. With `create_dir`, missing
    /// parent directories are created too.
    ///
    /// Fails with [`FSLockError::is_already_locked`] if anything holds the lock, including
    /// this process.
    fn create_and_lock(
        &self,
        path:       &Path,
        create_dir: bool,
    ) -> Result<Self::Lockfile, Self::LockError>;
}
