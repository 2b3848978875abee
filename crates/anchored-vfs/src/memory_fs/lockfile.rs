use std::error::Error as StdError;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};

use crate::util_traits::FSLockError;


#[derive(Default, Debug)]
pub(super) struct Locks(Vec<PathBuf>);

impl Locks {
    /// Attempt to lock the indicated path, succeeding if and only if the path was not
    /// already locked.
    pub(super) fn try_lock(&mut self, path: PathBuf) -> Result<Lockfile, LockError> {
        if self.0.contains(&path) {
            Err(LockError::AlreadyLocked(path))
        } else {
            self.0.push(path.clone());
            Ok(Lockfile { path })
        }
    }

    /// Unlock the given lockfile.
    ///
    /// This only fails if the [`Lockfile`] came from a different [`MemoryFS`].
    ///
    /// [`MemoryFS`]: super::MemoryFS
    pub(super) fn unlock(&mut self, lockfile: Lockfile) -> Result<(), LockError> {
        let locked_idx = self.0
            .iter()
            .position(|locked_path| locked_path == &lockfile.path);

        if let Some(locked_idx) = locked_idx {
            self.0.swap_remove(locked_idx);
            Ok(())
        } else {
            Err(LockError::NotLocked(lockfile.path))
        }
    }
}

#[derive(Debug)]
pub struct Lockfile {
    path: PathBuf,
}

impl Lockfile {
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    AlreadyLocked(PathBuf),
    NotLocked(PathBuf),
    NotFound(PathBuf),
}

impl Display for LockError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::AlreadyLocked(path) => write!(
                f,
                "lockfile at path {} was already locked",
                path.display(),
            ),
            Self::NotLocked(path) => write!(
                f,
                "attempted to unlock a lockfile at path {}, which was not locked by this MemoryFS",
                path.display(),
            ),
            Self::NotFound(path) => write!(
                f,
                "there is no lockfile at path {}",
                path.display(),
            ),
        }
    }
}

impl StdError for LockError {}

impl FSLockError for LockError {
    #[inline]
    fn is_already_locked(&self) -> bool {
        matches!(self, Self::AlreadyLocked(_))
    }

    #[inline]
    fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
