use std::path::Path;
use std::fmt::{Debug, Formatter, Result as FmtResult};

use tracing::{Level as LogLevel, event};

use anchored_vfs::traits::WritableFilesystem;

use crate::database_files::DbFileName;


/// Holds the `LOCK` file of a database directory, and unlocks it when dropped.
///
/// Both [`Database`] and [`reduce_levels`] hold one for as long as they use the directory, so at
/// most one of them can use a database at a time.
///
/// [`Database`]: crate::Database
/// [`reduce_levels`]: crate::reduce_levels
pub(crate) struct DbLock<'a, FS: WritableFilesystem> {
    filesystem: &'a FS,
    /// Aside from in [`DbLock::into_lockfile`] and the destructor, this is `Some`.
    lockfile:   Option<FS::Lockfile>,
}

#[expect(unreachable_pub, reason = "control visibility at type definition")]
impl<'a, FS: WritableFilesystem> DbLock<'a, FS> {
    /// Lock the `LOCK` file of `db_directory`, creating it (but not its directory) if needed.
    pub fn acquire(filesystem: &'a FS, db_directory: &Path) -> Result<Self, FS::LockError> {
        let lock_path = DbFileName::Lockfile.file_path(db_directory);
        let lockfile = filesystem.create_and_lock(&lock_path, false)?;
        Ok(Self {
            filesystem,
            lockfile: Some(lockfile),
        })
    }

    /// Keep the `LOCK` file locked, handing responsibility for unlocking it to the caller.
    pub fn into_lockfile(mut self) -> FS::Lockfile {
        #[expect(clippy::unwrap_used, reason = "`lockfile` is `Some` outside of `drop`")]
        self.lockfile.take().unwrap()
    }
}

impl<FS: WritableFilesystem> Drop for DbLock<'_, FS> {
    fn drop(&mut self) {
        if let Some(lockfile) = self.lockfile.take() {
            // There's not much we can do if unlocking the lockfile fails.
            if let Err(lock_error) = self.filesystem.unlock_and_close(lockfile) {
                event!(LogLevel::DEBUG, "error while unlocking LOCK file: {lock_error}");
            }
        }
    }
}

impl<FS: WritableFilesystem> Debug for DbLock<'_, FS> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("DbLock")
            .field("filesystem", &"<FS>")
            .field("lockfile",   &"<LOCK file>")
            .finish()
    }
}
