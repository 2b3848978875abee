use std::error::Error as StdError;
use std::io::{Result as IoResult, Write};


/// A file returned by [`WritableFilesystem::open_writable`]. Writes may be buffered.
///
/// [`WritableFilesystem::open_writable`]: crate::traits::WritableFilesystem::open_writable
pub trait WritableFile: Write {
    /// Flush any buffered data, then make the file's contents and length durable.
    ///
    /// A manifest or table file is only referenced after this has succeeded.
    /// [`File::sync_data`] is enough to implement it.
    ///
    /// [`File::sync_data`]: std::fs::File::sync_data
    fn sync_data(&mut self) -> IoResult<()>;
}

pub trait FSError: StdError {
    /// Whether the file or directory in question does not exist.
    fn is_not_found(&self) -> bool;
}

pub trait FSLockError: StdError {
    fn is_already_locked(&self) -> bool;
    /// Whether the lockfile, or the directory meant to hold it, does not exist.
    fn is_not_found(&self) -> bool;
}
