use std::{
    io::{Error as IoError, Read as _, Write as _},
    path::{Path, PathBuf},
};

use thiserror::Error;

use anchored_vfs::traits::{ReadableFilesystem, WritableFile as _, WritableFilesystem};

use crate::format::FileNumber;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DbFileName {
    Lockfile,
    Table {
        file_number: FileNumber,
    },
    Manifest {
        file_number: FileNumber,
    },
    Current,
    Temp {
        file_number: FileNumber,
    },
    InfoLog,
    OldInfoLog,
}

#[expect(unreachable_pub, reason = "control visibility at type definition")]
impl DbFileName {
    #[must_use]
    pub fn parse(file_name: &str) -> Option<Self> {
        // All valid file names are valid 7-bit ASCII and thus valid UTF-8.

        // Note that all the valid file names are nonempty
        let &first_byte = file_name.as_bytes().first()?;
        // `from_str_radix` permits a leading sign, including `+`. We need to reject this case.
        if first_byte == b'+' {
            return None;
        }

        if let Some(file_number) = file_name.strip_suffix(".ldb") {
            let file_number = FileNumber(u64::from_str_radix(file_number, 10).ok()?);
            Some(Self::Table { file_number })

        } else if let Some(file_number) = file_name.strip_suffix(".dbtmp") {
            let file_number = FileNumber(u64::from_str_radix(file_number, 10).ok()?);
            Some(Self::Temp { file_number })

        } else if let Some(file_number) = file_name.strip_prefix("MANIFEST-") {
            // Any file number, even 0, would make it nonempty.
            let &first_num_byte = file_number.as_bytes().first()?;
            if first_num_byte == b'+' {
                return None;
            }

            let file_number = FileNumber(u64::from_str_radix(file_number, 10).ok()?);
            Some(Self::Manifest { file_number })

        } else {
            Some(match file_name {
                "LOCK"    => Self::Lockfile,
                "CURRENT" => Self::Current,
                "LOG"     => Self::InfoLog,
                "LOG.old" => Self::OldInfoLog,
                _         => return None,
            })
        }
    }

    #[must_use]
    pub fn file_name(self) -> String {
        match self {
            Self::Lockfile                 => "LOCK".to_owned(),
            Self::Table { file_number }    => format!("{:06}.ldb",      file_number.0),
            Self::Manifest { file_number } => format!("MANIFEST-{:06}", file_number.0),
            Self::Current                  => "CURRENT".to_owned(),
            Self::Temp { file_number }     => format!("{:06}.dbtmp",    file_number.0),
            Self::InfoLog                  => "LOG".to_owned(),
            Self::OldInfoLog               => "LOG.old".to_owned(),
        }
    }

    #[must_use]
    pub fn file_path(self, directory: &Path) -> PathBuf {
        directory.join(self.file_name())
    }
}

/// Read the name of the current manifest from the `CURRENT` file.
///
/// Returns `Ok(None)` if there is no `CURRENT` file.
pub(crate) fn read_current<FS: ReadableFilesystem>(
    filesystem:   &FS,
    db_directory: &Path,
) -> Result<Option<FileNumber>, ReadCurrentError<FS::Error>> {
    use anchored_vfs::traits::FSError as _;

    let current_path = DbFileName::Current.file_path(db_directory);
    let mut current_file = match filesystem.open_sequential(&current_path) {
        Ok(file)                       => file,
        Err(err) if err.is_not_found() => return Ok(None),
        Err(err)                       => return Err(ReadCurrentError::Open(err)),
    };

    let mut contents = String::new();
    current_file.read_to_string(&mut contents).map_err(ReadCurrentError::Read)?;

    let manifest_name = contents
        .strip_suffix('\n')
        .ok_or_else(|| ReadCurrentError::Malformed(contents.clone()))?;

    match DbFileName::parse(manifest_name) {
        Some(DbFileName::Manifest { file_number }) => Ok(Some(file_number)),
        _ => Err(ReadCurrentError::Malformed(contents)),
    }
}

/// Atomically point the `CURRENT` file at `MANIFEST-{manifest_file_number}`.
///
/// The new contents are written to a temporary file, which is synced and then renamed over
/// `CURRENT`; afterwards the database directory is synced so that the rename is durable.
/// If any step before the rename fails, `CURRENT` is left untouched and the temporary file is
/// deleted.
pub(crate) fn set_current<FS: WritableFilesystem>(
    filesystem:           &FS,
    db_directory:         &Path,
    manifest_file_number: FileNumber,
) -> Result<(), SetCurrentError<FS::Error>> {
    /// Used for a `try` scope.
    fn perform_writes<FS: WritableFilesystem>(
        filesystem:    &FS,
        db_directory:  &Path,
        manifest_name: &str,
        temp_path:     &Path,
        mut temp_file: FS::WriteFile,
    ) -> Result<(), SetCurrentError<FS::Error>> {
        temp_file.write_all(manifest_name.as_bytes()).map_err(SetCurrentError::Write)?;
        temp_file.write_all(b"\n").map_err(SetCurrentError::Write)?;

        temp_file.sync_data().map_err(SetCurrentError::FileFsync)?;
        drop(temp_file);

        filesystem
            .rename(temp_path, &DbFileName::Current.file_path(db_directory))
            .map_err(SetCurrentError::Rename)?;

        Ok(())
    }

    let manifest_name = DbFileName::Manifest { file_number: manifest_file_number }.file_name();
    let temp_path = DbFileName::Temp { file_number: manifest_file_number }
        .file_path(db_directory);

    let temp_file = filesystem
        .open_writable(&temp_path, false)
        .map_err(SetCurrentError::Open)?;

    if let Err(error) = perform_writes(
        filesystem,
        db_directory,
        &manifest_name,
        &temp_path,
        temp_file,
    ) {
        // Ignore any additional error; the original error is the only important thing.
        // At worst, the leftover file will be garbage-collected the next time the database
        // is opened.
        let _err = filesystem.delete(&temp_path);
        return Err(error);
    }

    filesystem
        .sync_directory(db_directory)
        .map_err(SetCurrentError::DirectoryFsync)
}

#[derive(Error, Debug)]
pub(crate) enum ReadCurrentError<FilesystemError> {
    #[error("filesystem error when opening the CURRENT file: {0}")]
    Open(FilesystemError),
    #[error("error when reading the CURRENT file: {0}")]
    Read(IoError),
    #[error("the CURRENT file does not name a manifest: {0:?}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum SetCurrentError<FilesystemError> {
    /// An error from opening a temporary file.
    #[error("filesystem error when opening a temp file, preventing update of CURRENT file: {0}")]
    Open(FilesystemError),
    /// An error from writing to a file.
    #[error("write error, preventing update of CURRENT file: {0}")]
    Write(IoError),
    /// An error from renaming a temporary file to CURRENT.
    #[error("filesystem error when renaming a temp file to the CURRENT file: {0}")]
    Rename(FilesystemError),
    /// A likely-fatal error while attempting to sync the data of a file.
    #[error("likely-fatal fsyncdata error while setting CURRENT file: {0}")]
    FileFsync(IoError),
    /// A likely-fatal error while attempting to sync the data of a directory.
    ///
    /// The rename has already happened, so `CURRENT` may or may not name the new manifest
    /// after a crash.
    #[error("likely-fatal directory fsync error after setting CURRENT file: {0}")]
    DirectoryFsync(FilesystemError),
}
