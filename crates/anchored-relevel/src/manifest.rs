use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    io::Error as IoError,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{Level as LogLevel, event};

use anchored_vfs::traits::WritableFilesystem;

use crate::{
    database_files::{DbFileName, ReadCurrentError, SetCurrentError, read_current, set_current},
    file_tracking::FileNumberAllocator,
    format::{FileNumber, SequenceNumber},
    version::{ApplyEditError, LevelAssignment, VersionBuilder, VersionEdit},
    write_log::{LogWriteError, WriteLogReader, WriteLogWriter},
};


/// The durable record of which table files are live and at which level, stored as a
/// `MANIFEST-_` file named by the `CURRENT` file of a database directory.
///
/// Every manifest written by this type starts with a full snapshot of the level assignment;
/// [`log_and_apply`] appends incremental edits after it. Replacing the whole assignment at once
/// is done by [`commit_assignment`], which writes a brand-new manifest and switches `CURRENT`
/// over to it, so that a crash or error at any point leaves either the old or the new
/// assignment in effect.
///
/// [`log_and_apply`]: ManifestStore::log_and_apply
/// [`commit_assignment`]: ManifestStore::commit_assignment
pub struct ManifestStore<FS: WritableFilesystem> {
    db_directory:     PathBuf,
    manifest_number:  FileNumber,
    /// `None` after recovery, or after a failed append left the tail of the manifest in an
    /// unknown state. The next edit is then written as a snapshot to a new manifest.
    writer:           Option<WriteLogWriter<FS::WriteFile>>,
    assignment:       LevelAssignment,
    next_file_number: FileNumber,
    last_sequence:    SequenceNumber,
}

impl<FS: WritableFilesystem> ManifestStore<FS> {
    /// Write `MANIFEST-000001` describing an empty database with `num_levels` levels, and point
    /// `CURRENT` at it. The directory must already exist.
    pub fn create(
        filesystem:   &FS,
        db_directory: &Path,
        num_levels:   u8,
    ) -> Result<Self, CommitError<FS::Error>> {
        let manifest_number = FileNumber(1);
        let assignment = LevelAssignment::new_empty(num_levels);
        let next_file_number = manifest_number.next();
        let last_sequence = SequenceNumber::ZERO;

        let snapshot = assignment.snapshot_edit(next_file_number, last_sequence);
        let writer = write_new_manifest(filesystem, db_directory, manifest_number, &snapshot)?;

        event!(
            LogLevel::INFO,
            "created manifest {manifest_number} with {num_levels} levels in {}",
            db_directory.display(),
        );

        Ok(Self {
            db_directory: db_directory.to_owned(),
            manifest_number,
            writer: Some(writer),
            assignment,
            next_file_number,
            last_sequence,
        })
    }

    /// Read the manifest named by `CURRENT`, replaying every edit in it.
    pub fn recover(
        filesystem:   &FS,
        db_directory: &Path,
    ) -> Result<Self, RecoverError<FS::Error>> {
        let manifest_number = match read_current(filesystem, db_directory) {
            Ok(Some(manifest_number)) => manifest_number,
            Ok(None) => return Err(RecoverError::NotFound(db_directory.to_owned())),
            Err(ReadCurrentError::Open(err)) => return Err(RecoverError::Filesystem(err)),
            Err(ReadCurrentError::Read(err)) => return Err(RecoverError::Io(err)),
            Err(ReadCurrentError::Malformed(contents)) => {
                return Err(RecoverError::Corruption {
                    file:   DbFileName::Current.file_name(),
                    reason: format!("does not name a manifest: {contents:?}"),
                });
            }
        };

        let manifest_name = DbFileName::Manifest { file_number: manifest_number };
        let corruption = |reason: String| RecoverError::Corruption {
            file: manifest_name.file_name(),
            reason,
        };

        let manifest_file = filesystem
            .open_sequential(&manifest_name.file_path(db_directory))
            .map_err(RecoverError::Filesystem)?;
        let mut reader = WriteLogReader::new(manifest_file).map_err(RecoverError::Io)?;

        let mut builder = VersionBuilder::new(LevelAssignment::new_empty(0));
        let mut num_records = 0_usize;
        let mut saw_num_levels = false;

        while let Some(record) = reader
            .read_record()
            .map_err(|err| corruption(err.to_string()))?
        {
            let edit = VersionEdit::decode_from(record)
                .map_err(|err| corruption(format!("record {num_records}: {err}")))?;
            saw_num_levels |= edit.num_levels.is_some();
            builder
                .apply(&edit)
                .map_err(|err| corruption(format!("record {num_records}: {err}")))?;
            num_records += 1;
        }

        let (assignment, next_file_number, last_sequence) = builder.finish();
        if !saw_num_levels {
            return Err(corruption("no level count is recorded".to_owned()));
        }
        let Some(next_file_number) = next_file_number else {
            return Err(corruption("no next file number is recorded".to_owned()));
        };

        // Guard against a next file number which would reuse a live number.
        let mut file_numbers = FileNumberAllocator::new(next_file_number);
        file_numbers.mark_used(manifest_number);
        for (_, file) in assignment.iter_files() {
            file_numbers.mark_used(file.file_number());
        }

        event!(
            LogLevel::INFO,
            "recovered manifest {manifest_number} ({num_records} records, {} files, levels {:?})",
            assignment.total_files(),
            assignment.file_counts(),
        );

        Ok(Self {
            db_directory: db_directory.to_owned(),
            manifest_number,
            writer: None,
            assignment,
            next_file_number: file_numbers.next_file_number(),
            last_sequence: last_sequence.unwrap_or(SequenceNumber::ZERO),
        })
    }

    #[inline]
    #[must_use]
    pub const fn current_assignment(&self) -> &LevelAssignment {
        &self.assignment
    }

    #[inline]
    #[must_use]
    pub const fn manifest_number(&self) -> FileNumber {
        self.manifest_number
    }

    #[inline]
    #[must_use]
    pub const fn next_file_number(&self) -> FileNumber {
        self.next_file_number
    }

    #[inline]
    #[must_use]
    pub const fn last_sequence(&self) -> SequenceNumber {
        self.last_sequence
    }

    /// An allocator continuing from the recorded next file number.
    #[inline]
    #[must_use]
    pub const fn file_number_allocator(&self) -> FileNumberAllocator {
        FileNumberAllocator::new(self.next_file_number)
    }

    /// Durably replace the current level assignment with `assignment`.
    ///
    /// `next_file_number` must be above every file number handed out since this store's file
    /// numbers were last read, such as those of freshly written table files referenced by
    /// `assignment`. The new manifest takes the next file number after it.
    ///
    /// If an error is returned before `CURRENT` was replaced, the previous manifest stays
    /// authoritative, the new manifest file is deleted, and `self` is unchanged.
    /// See [`CommitError::SyncDirectory`] for the one exception.
    pub fn commit_assignment(
        &mut self,
        filesystem:       &FS,
        assignment:       LevelAssignment,
        next_file_number: FileNumber,
    ) -> Result<(), CommitError<FS::Error>> {
        let mut file_numbers = FileNumberAllocator::new(self.next_file_number);
        if let Some(last_used) = next_file_number.0.checked_sub(1) {
            file_numbers.mark_used(FileNumber(last_used));
        }
        let new_manifest = file_numbers.allocate();

        self.switch_to_new_manifest(
            filesystem,
            new_manifest,
            assignment,
            file_numbers.next_file_number(),
            self.last_sequence,
        )
    }

    /// Durably apply an incremental edit, such as one adding a flushed table file.
    ///
    /// The `next_file_number` and `last_sequence` of `edit`, if set, replace the recorded ones.
    /// On error, `self` is unchanged, except as described by [`CommitError::SyncDirectory`].
    pub(crate) fn log_and_apply(
        &mut self,
        filesystem: &FS,
        edit:       &VersionEdit,
    ) -> Result<(), CommitError<FS::Error>> {
        let mut builder = VersionBuilder::new(self.assignment.clone());
        builder.apply(edit).map_err(CommitError::InvalidEdit)?;
        let (assignment, next_file_number, last_sequence) = builder.finish();
        let next_file_number = next_file_number.unwrap_or(self.next_file_number);
        let last_sequence = last_sequence.unwrap_or(self.last_sequence);

        let Some(writer) = &mut self.writer else {
            let mut file_numbers = FileNumberAllocator::new(next_file_number);
            let new_manifest = file_numbers.allocate();
            return self.switch_to_new_manifest(
                filesystem,
                new_manifest,
                assignment,
                file_numbers.next_file_number(),
                last_sequence,
            );
        };

        let mut record = Vec::new();
        edit.encode(&mut record);

        let result = writer
            .add_record(&record)
            .map_err(|LogWriteError(err)| err)
            .and_then(|()| writer.sync_log_data());

        if let Err(err) = result {
            // The tail of the manifest is now unknown; never append to it again.
            self.writer = None;
            return Err(CommitError::WriteManifest(self.manifest_number, err));
        }

        self.assignment = assignment;
        self.next_file_number = next_file_number;
        self.last_sequence = last_sequence;
        Ok(())
    }

    fn switch_to_new_manifest(
        &mut self,
        filesystem:       &FS,
        new_manifest:     FileNumber,
        assignment:       LevelAssignment,
        next_file_number: FileNumber,
        last_sequence:    SequenceNumber,
    ) -> Result<(), CommitError<FS::Error>> {
        let snapshot = assignment.snapshot_edit(next_file_number, last_sequence);
        let (writer, unsynced) = match write_new_manifest(
            filesystem,
            &self.db_directory,
            new_manifest,
            &snapshot,
        ) {
            Ok(writer)                                 => (Some(writer), None),
            Err(err @ CommitError::SyncDirectory(..)) => (None, Some(err)),
            Err(err)                                   => return Err(err),
        };

        let old_manifest = self.manifest_number;
        self.manifest_number = new_manifest;
        self.writer = writer;
        self.assignment = assignment;
        self.next_file_number = next_file_number;
        self.last_sequence = last_sequence;

        event!(
            LogLevel::INFO,
            "switched to manifest {new_manifest} (levels {:?})",
            self.assignment.file_counts(),
        );

        if let Some(err) = unsynced {
            // After a crash, `CURRENT` might still name the old manifest.
            return Err(err);
        }

        let old_path = DbFileName::Manifest { file_number: old_manifest }
            .file_path(&self.db_directory);
        if let Err(err) = filesystem.delete(&old_path) {
            event!(
                LogLevel::WARN,
                "could not delete obsolete manifest {}: {err}",
                old_path.display(),
            );
        }

        Ok(())
    }
}

/// Write `snapshot` as the only record of a new manifest, sync it, and make it current.
///
/// On failure, the new manifest is deleted (if `CURRENT` was not yet switched over).
fn write_new_manifest<FS: WritableFilesystem>(
    filesystem:      &FS,
    db_directory:    &Path,
    manifest_number: FileNumber,
    snapshot:        &VersionEdit,
) -> Result<WriteLogWriter<FS::WriteFile>, CommitError<FS::Error>> {
    let manifest_path = DbFileName::Manifest { file_number: manifest_number }
        .file_path(db_directory);

    let file = filesystem
        .open_writable(&manifest_path, false)
        .map_err(|err| CommitError::CreateManifest(manifest_number, err))?;
    let mut writer = WriteLogWriter::new_empty(file);

    let mut record = Vec::new();
    snapshot.encode(&mut record);

    let written = writer
        .add_record(&record)
        .map_err(|LogWriteError(err)| err)
        .and_then(|()| writer.sync_log_data())
        .map_err(|err| CommitError::WriteManifest(manifest_number, err))
        .and_then(|()| {
            set_current(filesystem, db_directory, manifest_number).map_err(CommitError::SetCurrent)
        });

    match written {
        Ok(()) => Ok(writer),
        Err(CommitError::SetCurrent(SetCurrentError::DirectoryFsync(err))) => {
            // `CURRENT` already names the new manifest, so it must not be deleted.
            Err(CommitError::SyncDirectory(manifest_number, err))
        }
        Err(err) => {
            drop(writer);
            if let Err(delete_err) = filesystem.delete(&manifest_path) {
                event!(
                    LogLevel::WARN,
                    "could not delete abandoned manifest {}: {delete_err}",
                    manifest_path.display(),
                );
            }
            Err(err)
        }
    }
}

impl<FS: WritableFilesystem> Debug for ManifestStore<FS> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ManifestStore")
            .field("db_directory",     &self.db_directory)
            .field("manifest_number",  &self.manifest_number)
            .field("writer",           &self.writer)
            .field("assignment",       &self.assignment)
            .field("next_file_number", &self.next_file_number)
            .field("last_sequence",    &self.last_sequence)
            .finish()
    }
}

#[derive(Error, Debug)]
pub enum RecoverError<FsError> {
    /// There is no `CURRENT` file, so there is no database in the directory.
    #[error("no database in {}: the CURRENT file does not exist", .0.display())]
    NotFound(PathBuf),
    #[error("filesystem error while reading the manifest: {0}")]
    Filesystem(FsError),
    #[error("IO error while reading the manifest: {0}")]
    Io(IoError),
    #[error("corruption in {file}: {reason}")]
    Corruption {
        file:   String,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum CommitError<FsError> {
    #[error("could not create manifest {0}: {1}")]
    CreateManifest(FileNumber, FsError),
    #[error("could not write or sync manifest {0}: {1}")]
    WriteManifest(FileNumber, IoError),
    #[error("could not make the new manifest current: {0}")]
    SetCurrent(SetCurrentError<FsError>),
    /// `CURRENT` was replaced, but the directory entry could not be synced. After a crash,
    /// either manifest may be current. Neither manifest is deleted, and the store continues
    /// with the new one; its next edit starts yet another manifest.
    #[error("manifest {0} was made current, but the directory could not be synced: {1}")]
    SyncDirectory(FileNumber, FsError),
    #[error("the version edit does not apply to the current assignment: {0}")]
    InvalidEdit(ApplyEditError),
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anchored_vfs::{traits::ReadableFilesystem as _, Fault, FaultKind, MemoryFS};

    use crate::file_tracking::{FileMetadata, Level};
    use super::*;


    fn dir() -> &'static Path {
        Path::new("/db")
    }

    fn new_fs() -> MemoryFS {
        let fs = MemoryFS::new();
        fs.create_dir_all(dir()).unwrap();
        fs
    }

    fn table(number: u64, smallest: &[u8], largest: &[u8]) -> Arc<FileMetadata> {
        Arc::new(FileMetadata::new(
            FileNumber(number),
            64,
            smallest,
            largest,
            SequenceNumber::new_usable(1).unwrap(),
            SequenceNumber::new_usable(number).unwrap(),
        ))
    }

    fn add_edit(level: u8, file: Arc<FileMetadata>, next_file_number: u64) -> VersionEdit {
        let mut edit = VersionEdit::new_empty();
        edit.new_files.push((Level::new(level), file));
        edit.next_file_number = Some(FileNumber(next_file_number));
        edit
    }

    #[test]
    fn create_then_recover() {
        let fs = new_fs();
        let store = ManifestStore::create(&fs, dir(), 4).unwrap();
        assert_eq!(store.manifest_number(), FileNumber(1));

        let recovered = ManifestStore::<MemoryFS>::recover(&fs, dir()).unwrap();
        assert_eq!(recovered.current_assignment(), &LevelAssignment::new_empty(4));
        assert_eq!(recovered.next_file_number(), FileNumber(2));
    }

    #[test]
    fn recover_missing_database() {
        let fs = new_fs();
        assert!(matches!(
            ManifestStore::<MemoryFS>::recover(&fs, dir()),
            Err(RecoverError::NotFound(_)),
        ));
    }

    #[test]
    fn appended_edits_are_replayed() {
        let fs = new_fs();
        let mut store = ManifestStore::create(&fs, dir(), 3).unwrap();
        store.log_and_apply(&fs, &add_edit(2, table(5, b"a", b"c"), 6)).unwrap();
        store.log_and_apply(&fs, &add_edit(0, table(6, b"b", b"d"), 7)).unwrap();

        let recovered = ManifestStore::<MemoryFS>::recover(&fs, dir()).unwrap();
        assert_eq!(recovered.current_assignment(), store.current_assignment());
        assert_eq!(recovered.current_assignment().file_counts(), [1, 0, 1]);
        assert_eq!(recovered.next_file_number(), FileNumber(7));
    }

    #[test]
    fn edit_after_recovery_starts_new_manifest() {
        let fs = new_fs();
        ManifestStore::create(&fs, dir(), 2).unwrap();

        let mut store = ManifestStore::<MemoryFS>::recover(&fs, dir()).unwrap();
        store.log_and_apply(&fs, &add_edit(1, table(2, b"a", b"b"), 3)).unwrap();
        assert_eq!(store.manifest_number(), FileNumber(3));
        assert!(!fs.exists(&dir().join("MANIFEST-000001")).unwrap());

        let recovered = ManifestStore::<MemoryFS>::recover(&fs, dir()).unwrap();
        assert_eq!(recovered.current_assignment().file_counts(), [0, 1]);
        assert_eq!(recovered.next_file_number(), FileNumber(4));
    }

    #[test]
    fn commit_replaces_assignment() {
        let fs = new_fs();
        let mut store = ManifestStore::create(&fs, dir(), 4).unwrap();
        store.log_and_apply(&fs, &add_edit(3, table(2, b"a", b"b"), 3)).unwrap();

        let mut reduced = LevelAssignment::new_empty(3);
        reduced.add_file(Level::new(2), table(2, b"a", b"b")).unwrap();
        store.commit_assignment(&fs, reduced.clone(), FileNumber(9)).unwrap();

        assert_eq!(store.manifest_number(), FileNumber(9));
        assert!(!fs.exists(&dir().join("MANIFEST-000001")).unwrap());

        let recovered = ManifestStore::<MemoryFS>::recover(&fs, dir()).unwrap();
        assert_eq!(recovered.current_assignment(), &reduced);
        assert_eq!(recovered.next_file_number(), FileNumber(10));
    }

    #[test]
    fn failed_commit_leaves_previous_manifest() {
        let fs = new_fs();
        let mut store = ManifestStore::create(&fs, dir(), 4).unwrap();
        store.log_and_apply(&fs, &add_edit(3, table(2, b"a", b"b"), 3)).unwrap();
        let before = store.current_assignment().clone();

        for fault in [
            Fault::new(FaultKind::OpenWrite, "MANIFEST-000003"),
            Fault::new(FaultKind::Sync, "MANIFEST-000003"),
            Fault::new(FaultKind::OpenWrite, "dbtmp"),
            Fault::new(FaultKind::Rename, "dbtmp"),
        ] {
            fs.inject_fault(fault);
            let reduced = LevelAssignment::new_empty(3);
            assert!(store.commit_assignment(&fs, reduced, FileNumber(3)).is_err());
            fs.clear_faults();

            assert_eq!(store.current_assignment(), &before);
            assert!(!fs.exists(&dir().join("MANIFEST-000003")).unwrap());
            let recovered = ManifestStore::<MemoryFS>::recover(&fs, dir()).unwrap();
            assert_eq!(recovered.current_assignment(), &before);
        }
    }

    #[test]
    fn unsynced_commit_switches_manifest() {
        let fs = new_fs();
        let mut store = ManifestStore::create(&fs, dir(), 4).unwrap();
        store.log_and_apply(&fs, &add_edit(3, table(2, b"a", b"b"), 3)).unwrap();

        let mut reduced = LevelAssignment::new_empty(3);
        reduced.add_file(Level::new(2), table(2, b"a", b"b")).unwrap();
        fs.inject_fault(Fault::new(FaultKind::SyncDirectory, "db"));
        let err = store.commit_assignment(&fs, reduced.clone(), FileNumber(3)).unwrap_err();
        fs.clear_faults();

        assert!(matches!(err, CommitError::SyncDirectory(FileNumber(3), _)));
        assert_eq!(store.manifest_number(), FileNumber(3));
        assert_eq!(store.current_assignment(), &reduced);
        assert!(fs.exists(&dir().join("MANIFEST-000001")).unwrap());

        let recovered = ManifestStore::<MemoryFS>::recover(&fs, dir()).unwrap();
        assert_eq!(recovered.manifest_number(), FileNumber(3));
        assert_eq!(recovered.current_assignment(), &reduced);

        // Nothing more is appended to the unsynced manifest.
        store.log_and_apply(&fs, &add_edit(0, table(5, b"c", b"d"), 6)).unwrap();
        assert_eq!(store.manifest_number(), FileNumber(6));
        let recovered = ManifestStore::<MemoryFS>::recover(&fs, dir()).unwrap();
        assert_eq!(recovered.current_assignment().file_counts(), [1, 0, 1]);
    }

    #[test]
    fn corrupt_manifest_is_reported() {
        let fs = new_fs();
        ManifestStore::create(&fs, dir(), 4).unwrap();

        let path = dir().join("MANIFEST-000001");
        let mut contents = fs.read_file(&path).unwrap();
        let last = contents.len() - 1;
        contents[last] ^= 0xff;
        fs.write_file(&path, &contents);

        assert!(matches!(
            ManifestStore::<MemoryFS>::recover(&fs, dir()),
            Err(RecoverError::Corruption { .. }),
        ));
    }
}
