use std::fs::{self, File, ReadDir};
use std::{error::Error, path::{Path, PathBuf}};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    io::{BufWriter, Error as IoError, Result as IoResult, Write as _},
};

use fs4::fs_std::FileExt as FileLockExt;

use crate::util_traits::{FSError as _, FSLockError, WritableFile};
use crate::fs_traits::{ReadableFilesystem, WritableFilesystem};


// ================================================================
//  The filesystem
// ================================================================

/// The standard library's file system.
#[derive(Default, Debug, Clone, Copy)]
pub struct StandardFS;

impl ReadableFilesystem for StandardFS {
    type ReadFile          = File;
    type Error             = IoError;
    type DirectoryChildren = DirectoryChildren;
    type Lockfile          = Lockfile;
    type LockError         = LockError;

    #[inline]
    fn open_sequential(&self, path: &Path) -> Result<Self::ReadFile, Self::Error> {
        File::open(path)
    }

    #[inline]
    fn exists(&self, path: &Path) -> Result<bool, Self::Error> {
        path.try_exists()
    }

    #[inline]
    fn children(&self, path: &Path) -> Result<Self::DirectoryChildren, Self::Error> {
        path.read_dir().map(DirectoryChildren::new)
    }

    #[inline]
    fn size_of(&self, path: &Path) -> Result<u64, Self::Error> {
        path.metadata().map(|metadata| metadata.len())
    }

    #[inline]
    fn unlock_and_close(&self, lockfile: Self::Lockfile) -> Result<(), Self::LockError> {
        FileLockExt::unlock(&lockfile.0)?;
        Ok(())
    }
}

impl WritableFilesystem for StandardFS {
    type WriteFile = BufWriter<File>;

    fn open_writable(
        &self,
        path:       &Path,
        create_dir: bool,
    ) -> Result<Self::WriteFile, Self::Error> {
        if create_dir {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }

        File::create(path).map(BufWriter::new)
    }


    #[inline]
    fn delete(&self, path: &Path) -> Result<(), Self::Error> {
        fs::remove_file(path)
    }

    #[inline]
    fn create_dir_all(&self, path: &Path) -> Result<(), Self::Error> {
        fs::create_dir_all(path)
    }

    #[inline]
    fn rename(&self, old: &Path, new: &Path) -> Result<(), Self::Error> {
        fs::rename(old, new)
    }

    fn sync_directory(&self, path: &Path) -> Result<(), Self::Error> {
        cfg_if::cfg_if! {
            if #[cfg(unix)] {
                File::open(path)?.sync_all()
            } else {
                // Directories cannot be opened as files on Windows; renames there are
                // already durable once `MoveFileEx` returns.
                let _ = path;
                Ok(())
            }
        }
    }

    fn create_and_lock(
        &self,
        path:       &Path,
        create_dir: bool,
    ) -> Result<Self::Lockfile, Self::LockError> {
        if create_dir {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }

        // Open with `create` in order to create the lock if it doesn't exist,
        // and open with `append` in order to avoid overwriting any previous contents of the file.
        let lockfile = File::options()
            .append(true)
            .create(true)
            .open(path)?;

        match FileLockExt::try_lock_exclusive(&lockfile) {
            Ok(true)  => Ok(Lockfile(lockfile)),
            Ok(false) => Err(LockError::AlreadyLocked),
            Err(err)  => Err(LockError::Io(err)),
        }
    }
}

impl WritableFile for BufWriter<File> {
    #[inline]
    fn sync_data(&mut self) -> IoResult<()> {
        self.flush()?;
        self.get_ref().sync_data()
    }
}

// ================================================================
//  Other structs
// ================================================================

#[derive(Debug)]
pub struct DirectoryChildren {
    readdir_iter: ReadDir,
}

impl DirectoryChildren {
    #[inline]
    #[must_use]
    const fn new(readdir_iter: ReadDir) -> Self {
        Self {
            readdir_iter,
        }
    }
}

impl Iterator for DirectoryChildren {
    type Item = IoResult<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        let dir_entry = self.readdir_iter.next()?;

        Some(dir_entry.map(|dir_entry| dir_entry.file_name().into()))
    }
}

#[derive(Debug)]
pub struct Lockfile(File);

#[derive(Debug)]
pub enum LockError {
    AlreadyLocked,
    Io(IoError),
}

impl From<IoError> for LockError {
    #[inline]
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl Display for LockError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::AlreadyLocked => write!(f, "lockfile was already acquired by something else"),
            Self::Io(err)       => write!(f, "error while attempting to acquire lockfile: {err}"),
        }
    }
}

impl Error for LockError {}

impl FSLockError for LockError {
    #[inline]
    fn is_already_locked(&self) -> bool {
        matches!(self, Self::AlreadyLocked)
    }

    #[inline]
    fn is_not_found(&self) -> bool {
        if let Self::Io(err) = self {
            err.is_not_found()
        } else {
            false
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;


    #[test]
    fn second_lock_is_refused() {
        let dir = std::env::temp_dir().join(format!("anchored-vfs-lock-{}", std::process::id()));
        let path = dir.join("LOCK");
        let fs = StandardFS;

        let lockfile = fs.create_and_lock(&path, true).unwrap();
        let second = fs.create_and_lock(&path, true).unwrap_err();
        assert!(second.is_already_locked());

        fs.unlock_and_close(lockfile).unwrap();
        let relocked = fs.create_and_lock(&path, false).unwrap();
        fs.unlock_and_close(relocked).unwrap();

        fs::remove_dir_all(&dir).unwrap();
    }
}
