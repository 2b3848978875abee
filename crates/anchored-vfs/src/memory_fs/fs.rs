use std::{path::{Path, PathBuf}, sync::Arc, vec::IntoIter};
use std::io::{Cursor, Error as IoError, ErrorKind, Result as IoResult};

use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;

use crate::fs_traits::{ReadableFilesystem, WritableFilesystem};
use super::{
    fault::{Fault, FaultKind},
    file::{MemoryFile, SharedBuffer},
    lockfile::{LockError, Lockfile, Locks},
};


/// An in-memory virtual filesystem. Supports files and directories, but not links.
///
/// Cloning a `MemoryFS` produces another handle to the *same* filesystem, which makes it possible
/// to "reopen" a database on the same data, or to inspect the files a component produced.
///
/// Paths are used as given, without normalization; callers should consistently build paths with
/// [`Path::join`] from a common directory. The empty path and `/` are both treated as existing
/// root directories.
///
/// Failures can be injected with [`MemoryFS::inject_fault`]; see [`Fault`].
#[derive(Default, Debug, Clone)]
pub struct MemoryFS {
    state: Arc<Mutex<FsState>>,
}

#[derive(Default, Debug)]
pub(super) struct FsState {
    /// Invariant: if a file exists at a certain path, its parent exists in `directories`
    /// (or is a root directory).
    directories: HashSet<PathBuf>,
    files:       HashMap<PathBuf, SharedBuffer>,
    locks:       Locks,
    faults:      Vec<Fault>,
}

impl FsState {
    pub(super) fn check_faults(&mut self, kind: FaultKind, path: &Path) -> IoResult<()> {
        for fault in &mut self.faults {
            fault.check(kind, path)?;
        }
        Ok(())
    }

    fn directory_exists(&self, path: &Path) -> bool {
        is_root(path) || self.directories.contains(path)
    }

    fn parent_exists(&self, path: &Path) -> bool {
        path.parent().is_none_or(|parent| self.directory_exists(parent))
    }

    fn create_dir_all(&mut self, path: &Path) {
        for ancestor in path.ancestors() {
            if is_root(ancestor) {
                break;
            }
            self.directories.insert(ancestor.to_owned());
        }
    }

    fn create_file(&mut self, path: &Path, create_dir: bool, truncate: bool) -> IoResult<SharedBuffer> {
        if create_dir {
            if let Some(parent) = path.parent() {
                self.create_dir_all(parent);
            }
        } else if !self.parent_exists(path) {
            return Err(not_found(path));
        }

        if self.directories.contains(path) {
            return Err(IoError::new(
                ErrorKind::IsADirectory,
                format!("{} is a directory", path.display()),
            ));
        }

        let buffer = self.files
            .entry(path.to_owned())
            .or_insert_with(SharedBuffer::default);
        if truncate {
            buffer.lock().clear();
        }
        Ok(Arc::clone(buffer))
    }
}

impl MemoryFS {
    /// Create an empty `MemoryFS` with no files, and only the root directory.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make matching operations fail from now on; see [`Fault`].
    pub fn inject_fault(&self, fault: Fault) {
        self.state.lock().faults.push(fault);
    }

    /// Remove every injected fault.
    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    /// Get a copy of the contents of the file at `path`, if it exists.
    #[must_use]
    pub fn read_file(&self, path: &Path) -> Option<Vec<u8>> {
        let state = self.state.lock();
        state.files.get(path).map(|buffer| buffer.lock().clone())
    }

    /// Write `contents` to a new file at `path`, replacing the previous file contents if the file
    /// already existed. Parent directories are created as needed. Faults are not checked.
    pub fn write_file(&self, path: &Path, contents: &[u8]) {
        let mut state = self.state.lock();
        if let Ok(buffer) = state.create_file(path, true, true) {
            buffer.lock().extend_from_slice(contents);
        }
    }
}

impl ReadableFilesystem for MemoryFS {
    type ReadFile          = Cursor<Vec<u8>>;
    type Error             = IoError;
    type DirectoryChildren = DirectoryChildren;
    type Lockfile          = Lockfile;
    type LockError         = LockError;

    fn open_sequential(&self, path: &Path) -> Result<Self::ReadFile, Self::Error> {
        let mut state = self.state.lock();
        state.check_faults(FaultKind::OpenRead, path)?;

        let contents = state.files
            .get(path)
            .ok_or_else(|| not_found(path))?
            .lock()
            .clone();

        Ok(Cursor::new(contents))
    }

    fn exists(&self, path: &Path) -> Result<bool, Self::Error> {
        let state = self.state.lock();
        Ok(state.files.contains_key(path) || state.directory_exists(path))
    }

    fn children(&self, path: &Path) -> Result<Self::DirectoryChildren, Self::Error> {
        let state = self.state.lock();
        if !state.directory_exists(path) {
            return Err(not_found(path));
        }

        let is_child = |candidate: &&PathBuf| candidate.parent() == Some(path);
        let children = state.files.keys()
            .chain(state.directories.iter())
            .filter(is_child)
            .filter_map(|child| child.file_name())
            .map(|name| Ok(PathBuf::from(name)))
            .collect::<Vec<_>>();

        Ok(DirectoryChildren(children.into_iter()))
    }

    fn size_of(&self, path: &Path) -> Result<u64, Self::Error> {
        let state = self.state.lock();
        let len = state.files
            .get(path)
            .ok_or_else(|| not_found(path))?
            .lock()
            .len();

        Ok(u64::try_from(len).unwrap_or(u64::MAX))
    }

    fn unlock_and_close(&self, lockfile: Self::Lockfile) -> Result<(), Self::LockError> {
        self.state.lock().locks.unlock(lockfile)
    }
}

impl WritableFilesystem for MemoryFS {
    type WriteFile = MemoryFile;

    fn open_writable(
        &self,
        path:       &Path,
        create_dir: bool,
    ) -> Result<Self::WriteFile, Self::Error> {
        let mut state = self.state.lock();
        state.check_faults(FaultKind::OpenWrite, path)?;
        let buffer = state.create_file(path, create_dir, true)?;

        Ok(MemoryFile::new(path.to_owned(), buffer, Arc::clone(&self.state)))
    }

    fn delete(&self, path: &Path) -> Result<(), Self::Error> {
        let mut state = self.state.lock();
        state.check_faults(FaultKind::Delete, path)?;

        state.files
            .remove(path)
            .map(drop)
            .ok_or_else(|| not_found(path))
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), Self::Error> {
        let mut state = self.state.lock();
        if state.files.contains_key(path) {
            return Err(IoError::new(
                ErrorKind::AlreadyExists,
                format!("a file already exists at {}", path.display()),
            ));
        }
        state.create_dir_all(path);
        Ok(())
    }

    fn rename(&self, old: &Path, new: &Path) -> Result<(), Self::Error> {
        let mut state = self.state.lock();
        state.check_faults(FaultKind::Rename, old)?;

        if !state.parent_exists(new) {
            return Err(not_found(new));
        }
        let buffer = state.files
            .remove(old)
            .ok_or_else(|| not_found(old))?;
        state.files.insert(new.to_owned(), buffer);
        Ok(())
    }

    #[inline]
    fn sync_directory(&self, path: &Path) -> Result<(), Self::Error> {
        let mut state = self.state.lock();
        state.check_faults(FaultKind::SyncDirectory, path)?;
        if state.directory_exists(path) {
            Ok(())
        } else {
            Err(not_found(path))
        }
    }

    fn create_and_lock(
        &self,
        path:       &Path,
        create_dir: bool,
    ) -> Result<Self::Lockfile, Self::LockError> {
        let mut state = self.state.lock();
        if state.create_file(path, create_dir, false).is_err() {
            return Err(LockError::NotFound(path.to_owned()));
        }
        state.locks.try_lock(path.to_owned())
    }
}

#[derive(Debug)]
pub struct DirectoryChildren(IntoIter<IoResult<PathBuf>>);

impl Iterator for DirectoryChildren {
    type Item = IoResult<PathBuf>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

fn is_root(path: &Path) -> bool {
    path.as_os_str().is_empty() || path.parent().is_none()
}

fn not_found(path: &Path) -> IoError {
    IoError::new(ErrorKind::NotFound, format!("no such file or directory: {}", path.display()))
}


#[cfg(test)]
mod tests {
    use std::io::{Read as _, Write as _};

    use crate::{traits::{FSLockError as _, WritableFile as _}, FaultKind};
    use super::*;


    #[test]
    fn clones_share_files() {
        let fs = MemoryFS::new();
        let other = fs.clone();

        let mut file = fs.open_writable(Path::new("/db/a"), true).unwrap();
        file.write_all(b"hello").unwrap();
        file.sync_data().unwrap();

        let mut contents = String::new();
        other.open_sequential(Path::new("/db/a")).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "hello");
    }

    #[test]
    fn missing_parent_without_create_dir() {
        let fs = MemoryFS::new();
        let err = fs.open_writable(Path::new("/missing/a"), false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn rename_replaces_target() {
        let fs = MemoryFS::new();
        fs.write_file(Path::new("/db/CURRENT"), b"old");
        fs.write_file(Path::new("/db/tmp"), b"new");

        fs.rename(Path::new("/db/tmp"), Path::new("/db/CURRENT")).unwrap();
        assert_eq!(fs.read_file(Path::new("/db/CURRENT")).unwrap(), b"new");
        assert!(!fs.exists(Path::new("/db/tmp")).unwrap());
    }

    #[test]
    fn children_lists_direct_entries() {
        let fs = MemoryFS::new();
        fs.write_file(Path::new("/db/a"), b"");
        fs.write_file(Path::new("/db/b"), b"");
        fs.write_file(Path::new("/db/nested/c"), b"");

        let mut children = fs.children(Path::new("/db")).unwrap()
            .map(Result::unwrap)
            .collect::<Vec<_>>();
        children.sort();
        assert_eq!(children, [PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("nested")]);
    }

    #[test]
    fn locks_are_exclusive() {
        let fs = MemoryFS::new();
        let lock = fs.create_and_lock(Path::new("/db/LOCK"), true).unwrap();
        assert!(fs.clone().create_and_lock(Path::new("/db/LOCK"), true).unwrap_err().is_already_locked());

        fs.unlock_and_close(lock).unwrap();
        let lock = fs.create_and_lock(Path::new("/db/LOCK"), false).unwrap();
        fs.unlock_and_close(lock).unwrap();
    }

    #[test]
    fn faults_fire_after_skipped_matches() {
        let fs = MemoryFS::new();
        fs.inject_fault(Fault::new(FaultKind::Write, ".ldb").after(1));

        let mut file = fs.open_writable(Path::new("/db/000001.ldb"), true).unwrap();
        file.write_all(b"ok").unwrap();
        assert!(file.write_all(b"fails").is_err());

        let mut other = fs.open_writable(Path::new("/db/MANIFEST-000002"), true).unwrap();
        other.write_all(b"unaffected").unwrap();

        fs.clear_faults();
        file.write_all(b"!").unwrap();
        assert_eq!(fs.read_file(Path::new("/db/000001.ldb")).unwrap(), b"ok!");
    }
}
