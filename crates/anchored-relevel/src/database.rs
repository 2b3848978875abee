use std::{collections::HashSet, sync::Arc};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::Level as LogLevel;

use anchored_vfs::traits::{FSLockError, ReadableFilesystem, WritableFilesystem};

use crate::{
    config_constants::MAX_GRANDPARENT_OVERLAP_FACTOR,
    database_files::DbFileName,
    db_lock::DbLock,
    error::ErrorKind,
    file_tracking::{FileMetadata, Level},
    format::{EntryType, FileNumber, SequenceNumber},
    info_logger::InfoLogger,
    invariants::{Violation, validate},
    manifest::{CommitError, ManifestStore, RecoverError},
    memtable::Memtable,
    options::OpenOptions,
    table_cache::TableCache,
    table_file::{TableBuilder, TableEntry, TableError},
    version::{LevelAssignment, VersionEdit},
};


/// The error type of [`Database`] operations on the filesystem `FS`.
pub type DatabaseError<FS> = DbError<
    <FS as ReadableFilesystem>::Error,
    <FS as ReadableFilesystem>::LockError,
>;

/// A handle to an open database, holding its `LOCK` file.
///
/// Writes are buffered in a memtable until [`flush_memtable`] or [`close`] writes them to a new
/// table file and records that file in the manifest. There is no write-ahead log, so writes which
/// were never flushed are lost when the handle is dropped.
///
/// Table files are never compacted in the background; they stay at the level they were flushed
/// to until an offline migration such as [`reduce_levels`] moves them.
///
/// [`flush_memtable`]: Database::flush_memtable
/// [`close`]: Database::close
/// [`reduce_levels`]: crate::reduce_levels
pub struct Database<FS: WritableFilesystem> {
    filesystem:    FS,
    db_directory:  PathBuf,
    options:       OpenOptions,
    manifest:      ManifestStore<FS>,
    memtable:      Memtable,
    last_sequence: SequenceNumber,
    table_cache:   TableCache,
    info_logger:   InfoLogger<FS::WriteFile>,
    /// Aside from in [`Database::close`] and the destructor, this is `Some`.
    lockfile:      Option<FS::Lockfile>,
}

impl<FS: WritableFilesystem> Database<FS> {
    /// Open the database in `db_directory`, creating it if it is missing and
    /// `options.create_if_missing` is set.
    ///
    /// If the database was recorded with a different number of levels than `options.num_levels`,
    /// the new count is recorded, unless a file sits at a level which would no longer exist;
    /// in that case, opening fails with [`DbError::LevelsInUse`].
    ///
    /// Files in the directory which are not referenced by the current manifest are deleted.
    pub fn open(
        filesystem:   FS,
        db_directory: &Path,
        options:      OpenOptions,
    ) -> Result<Self, DatabaseError<FS>> {
        if options.num_levels == 0 {
            return Err(DbError::InvalidOptions("a database needs at least one level"));
        }
        if options.create_if_missing {
            filesystem.create_dir_all(db_directory).map_err(DbError::Filesystem)?;
        }

        let lock = DbLock::acquire(&filesystem, db_directory).map_err(|err| {
            if err.is_not_found() {
                DbError::NotFound(db_directory.to_owned())
            } else {
                DbError::Lock(err)
            }
        })?;

        // If anything fails from here on, dropping `lock` unlocks the database again.
        let manifest = recover_or_create(&filesystem, db_directory, &options)?;
        let mut info_logger = InfoLogger::open(&filesystem, db_directory, options.info_log_filter);
        info_logger.log(LogLevel::INFO, &format!(
            "opened database in {} with {} levels (files per level: {:?})",
            db_directory.display(),
            options.num_levels,
            manifest.current_assignment().file_counts(),
        ));

        let lockfile = lock.into_lockfile();
        let last_sequence = manifest.last_sequence();
        let database = Self {
            filesystem,
            db_directory: db_directory.to_owned(),
            options,
            manifest,
            memtable: Memtable::new(),
            last_sequence,
            table_cache: TableCache::new(options.table_cache_capacity),
            info_logger,
            lockfile: Some(lockfile),
        };
        database.remove_obsolete_files();
        Ok(database)
    }

    pub fn put(&mut self, user_key: &[u8], value: &[u8]) -> Result<(), DatabaseError<FS>> {
        self.write(user_key, EntryType::Value, value)
    }

    pub fn delete(&mut self, user_key: &[u8]) -> Result<(), DatabaseError<FS>> {
        self.write(user_key, EntryType::Deletion, &[])
    }

    fn write(
        &mut self,
        user_key:   &[u8],
        entry_type: EntryType,
        value:      &[u8],
    ) -> Result<(), DatabaseError<FS>> {
        if !fits_in_table(user_key.len()) || !fits_in_table(value.len()) {
            return Err(DbError::EntryTooLarge {
                key_len:   user_key.len(),
                value_len: value.len(),
            });
        }
        let sequence = self.last_sequence.checked_next().ok_or(DbError::SequenceExhausted)?;
        self.memtable.insert(user_key, sequence, entry_type, value);
        self.last_sequence = sequence;
        Ok(())
    }

    /// Get the newest value of `user_key`, or `None` if it was never written or was deleted.
    ///
    /// The memtable is searched first, then level 0 (whose files may overlap, so the newest
    /// entry among them wins), then each further level in turn.
    pub fn get(&self, user_key: &[u8]) -> Result<Option<Vec<u8>>, DatabaseError<FS>> {
        if let Some(entry) = self.memtable.get(user_key) {
            return Ok(live_value(entry.entry_type, &entry.value));
        }

        let assignment = self.manifest.current_assignment();

        let mut newest_in_level_zero: Option<TableEntry> = None;
        for file in assignment.files(Level::ZERO) {
            if !file.overlaps_range(user_key, user_key) {
                continue;
            }
            if let Some(entry) = self.lookup_in_file(file, user_key)? {
                let is_newer = newest_in_level_zero
                    .as_ref()
                    .is_none_or(|newest| newest.sequence < entry.sequence);
                if is_newer {
                    newest_in_level_zero = Some(entry);
                }
            }
        }
        if let Some(entry) = newest_in_level_zero {
            return Ok(live_value(entry.entry_type, &entry.value));
        }

        for level in Level::all_levels(assignment.num_levels()).skip(1) {
            let files = assignment.files(level);
            let index = files.partition_point(|file| file.largest_user_key() < user_key);
            let Some(file) = files.get(index) else { continue };
            if file.smallest_user_key() > user_key {
                continue;
            }
            if let Some(entry) = self.lookup_in_file(file, user_key)? {
                return Ok(live_value(entry.entry_type, &entry.value));
            }
        }

        Ok(None)
    }

    fn lookup_in_file(
        &self,
        file:     &FileMetadata,
        user_key: &[u8],
    ) -> Result<Option<TableEntry>, DatabaseError<FS>> {
        let table = self.table_cache
            .get_or_open(&self.filesystem, &self.db_directory, file)
            .map_err(DbError::Table)?;
        Ok(table.get(user_key).cloned())
    }

    /// Write the memtable to a new table file, and record the file in the manifest.
    ///
    /// The file is placed at level 0 if it overlaps a level-0 file. Otherwise, it is pushed down
    /// while the next level has no overlapping file, up to [`OpenOptions::max_memtable_flush_level`].
    pub fn flush_memtable(&mut self) -> Result<(), DatabaseError<FS>> {
        if self.memtable.is_empty() {
            return Ok(());
        }

        let mut file_numbers = self.manifest.file_number_allocator();
        let file_number = file_numbers.allocate();

        let metadata = match self.write_memtable(file_number) {
            Ok(Some(metadata)) => metadata,
            Ok(None) => {
                self.delete_table(file_number);
                return Ok(());
            }
            Err(err) => {
                self.delete_table(file_number);
                return Err(err);
            }
        };

        let assignment = self.manifest.current_assignment();
        let max_level = self.options.max_memtable_flush_level
            .min(assignment.num_levels().saturating_sub(1));
        let level = pick_level_for_flush(
            assignment,
            &metadata,
            Level::new(max_level),
            self.options.target_file_size.saturating_mul(MAX_GRANDPARENT_OVERLAP_FACTOR),
        );

        let mut edit = VersionEdit::new_empty();
        edit.next_file_number = Some(file_numbers.next_file_number());
        edit.last_sequence = Some(self.last_sequence);
        edit.new_files.push((level, Arc::new(metadata)));

        // If this fails, the table file is left for the obsolete file cleanup of the next open,
        // since the edit might have reached the manifest anyway.
        if let Err(err) = self.manifest.log_and_apply(&self.filesystem, &edit) {
            if matches!(err, CommitError::SyncDirectory(..)) {
                // The current manifest records the table, so the memtable is already flushed.
                self.memtable.clear();
            }
            return Err(DbError::Commit(err));
        }

        self.info_logger.log(LogLevel::INFO, &format!(
            "flushed {} entries to table {file_number} at {level}",
            self.memtable.len(),
        ));
        self.memtable.clear();
        Ok(())
    }

    fn write_memtable(
        &self,
        file_number: FileNumber,
    ) -> Result<Option<FileMetadata>, DatabaseError<FS>> {
        let path = DbFileName::Table { file_number }.file_path(&self.db_directory);
        let file = self.filesystem
            .open_writable(&path, false)
            .map_err(|err| DbError::Table(TableError::Create(file_number, err)))?;

        let mut builder = TableBuilder::new(file_number, file);
        for (user_key, entry) in self.memtable.iter() {
            builder
                .add(user_key, entry.sequence, entry.entry_type, &entry.value)
                .map_err(|err| DbError::Table(TableError::Write(file_number, err)))?;
        }
        builder
            .finish()
            .map_err(|err| DbError::Table(TableError::Write(file_number, err)))
    }

    fn delete_table(&self, file_number: FileNumber) {
        let path = DbFileName::Table { file_number }.file_path(&self.db_directory);
        if let Err(err) = self.filesystem.delete(&path) {
            tracing::event!(
                LogLevel::WARN,
                "could not delete table file {}: {err}",
                path.display(),
            );
        }
    }

    /// Delete every table file not referenced by the current manifest, every other manifest,
    /// and any temporary file left by an interrupted update of `CURRENT`.
    fn remove_obsolete_files(&self) {
        let children = match self.filesystem.children(&self.db_directory) {
            Ok(children) => children,
            Err(err) => {
                tracing::event!(LogLevel::WARN, "could not list the database directory: {err}");
                return;
            }
        };

        let live_tables = self.manifest
            .current_assignment()
            .iter_files()
            .map(|(_, file)| file.file_number())
            .collect::<HashSet<_>>();

        for child in children {
            let Ok(child) = child else { continue };
            let Some(file_name) = child.to_str().and_then(DbFileName::parse) else { continue };

            let obsolete = match file_name {
                DbFileName::Table { file_number }    => !live_tables.contains(&file_number),
                DbFileName::Manifest { file_number } => file_number != self.manifest.manifest_number(),
                DbFileName::Temp { .. }              => true,
                DbFileName::Lockfile
                | DbFileName::Current
                | DbFileName::InfoLog
                | DbFileName::OldInfoLog             => false,
            };
            if !obsolete {
                continue;
            }

            if let DbFileName::Table { file_number } = file_name {
                self.table_cache.evict(file_number);
            }
            let path = file_name.file_path(&self.db_directory);
            match self.filesystem.delete(&path) {
                Ok(()) => tracing::event!(LogLevel::INFO, "deleted obsolete file {}", path.display()),
                Err(err) => tracing::event!(
                    LogLevel::WARN,
                    "could not delete obsolete file {}: {err}",
                    path.display(),
                ),
            }
        }
    }

    /// The number of table files at `level`. Levels the database does not have hold no files.
    #[must_use]
    pub fn files_at_level(&self, level: Level) -> usize {
        self.manifest.current_assignment().files_at_level(level)
    }

    #[must_use]
    pub fn num_levels(&self) -> u8 {
        self.manifest.current_assignment().num_levels()
    }

    #[must_use]
    pub const fn level_assignment(&self) -> &LevelAssignment {
        self.manifest.current_assignment()
    }

    #[inline]
    #[must_use]
    pub fn db_directory(&self) -> &Path {
        &self.db_directory
    }

    /// Flush the memtable, and then unlock the database.
    ///
    /// If flushing fails, the database is still unlocked, and the unflushed writes are lost.
    pub fn close(mut self) -> Result<(), DatabaseError<FS>> {
        let flushed = self.flush_memtable();

        let unlocked = match self.lockfile.take() {
            Some(lockfile) => self.filesystem.unlock_and_close(lockfile).map_err(DbError::Unlock),
            None           => Ok(()),
        };

        flushed.and(unlocked)
    }
}

impl<FS: WritableFilesystem> Drop for Database<FS> {
    fn drop(&mut self) {
        if let Some(lockfile) = self.lockfile.take() {
            if !self.memtable.is_empty() {
                tracing::event!(
                    LogLevel::WARN,
                    "database dropped without closing; {} unflushed entries are lost",
                    self.memtable.len(),
                );
            }
            // There's not much we can do if unlocking the lockfile fails.
            if let Err(lock_error) = self.filesystem.unlock_and_close(lockfile) {
                tracing::event!(LogLevel::DEBUG, "error while unlocking LOCK file: {lock_error}");
            }
        }
    }
}

impl<FS: WritableFilesystem> Debug for Database<FS> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Database")
            .field("filesystem",    &"<FS>")
            .field("db_directory",  &self.db_directory)
            .field("options",       &self.options)
            .field("manifest",      &self.manifest)
            .field("memtable",      &self.memtable)
            .field("last_sequence", &self.last_sequence)
            .field("table_cache",   &self.table_cache)
            .field("lockfile",      &"<LOCK file>")
            .finish_non_exhaustive()
    }
}

fn recover_or_create<FS: WritableFilesystem>(
    filesystem:   &FS,
    db_directory: &Path,
    options:      &OpenOptions,
) -> Result<ManifestStore<FS>, DatabaseError<FS>> {
    let mut manifest = match ManifestStore::recover(filesystem, db_directory) {
        Ok(manifest) => manifest,
        Err(RecoverError::NotFound(_)) if options.create_if_missing => {
            return ManifestStore::create(filesystem, db_directory, options.num_levels)
                .map_err(DbError::Commit);
        }
        Err(RecoverError::NotFound(path)) => return Err(DbError::NotFound(path)),
        Err(err) => return Err(DbError::Recover(err)),
    };

    let assignment = manifest.current_assignment();
    validate(assignment, assignment.num_levels()).map_err(DbError::InvalidLayout)?;

    if let Some(max_level) = assignment.max_occupied_level() {
        if max_level.inner() >= options.num_levels {
            let file = assignment
                .files(max_level)
                .first()
                .map(|file| file.file_number())
                .unwrap_or(FileNumber(0));
            return Err(DbError::LevelsInUse {
                num_levels: options.num_levels,
                level:      max_level,
                file,
            });
        }
    }

    if assignment.num_levels() != options.num_levels {
        tracing::event!(
            LogLevel::INFO,
            "changing the recorded level count from {} to {}",
            assignment.num_levels(),
            options.num_levels,
        );
        let mut edit = VersionEdit::new_empty();
        edit.num_levels = Some(options.num_levels);
        manifest.log_and_apply(filesystem, &edit).map_err(DbError::Commit)?;
    }

    Ok(manifest)
}

/// Choose the level for a freshly flushed table, in the manner of LevelDB's
/// `PickLevelForMemTableOutput`.
fn pick_level_for_flush(
    assignment:              &LevelAssignment,
    flushed:                 &FileMetadata,
    max_level:               Level,
    max_grandparent_overlap: u64,
) -> Level {
    let overlapping = |level: Level| {
        assignment
            .files(level)
            .iter()
            .filter(|file| file.overlaps(flushed))
    };

    let mut level = Level::ZERO;
    if overlapping(Level::ZERO).next().is_some() {
        return level;
    }

    while level < max_level {
        let Some(next) = level.next_level() else { break };
        if overlapping(next).next().is_some() {
            break;
        }
        if let Some(grandparent) = next.next_level() {
            let overlap = overlapping(grandparent).map(|file| file.file_size()).sum::<u64>();
            if overlap > max_grandparent_overlap {
                break;
            }
        }
        level = next;
    }

    level
}

fn live_value(entry_type: EntryType, value: &[u8]) -> Option<Vec<u8>> {
    match entry_type {
        EntryType::Value    => Some(value.to_vec()),
        EntryType::Deletion => None,
    }
}

/// Whether a key or value of `len` bytes can be length-prefixed in a table file.
fn fits_in_table(len: usize) -> bool {
    u32::try_from(len).is_ok()
}

#[derive(Error, Debug)]
pub enum DbError<FsError, LockError> {
    #[error("invalid options: {0}")]
    InvalidOptions(&'static str),
    #[error("no database in {}", .0.display())]
    NotFound(PathBuf),
    #[error("could not lock the database: {0}")]
    Lock(LockError),
    #[error("could not unlock the database: {0}")]
    Unlock(LockError),
    #[error("file {file} is at {level}, which does not exist with {num_levels} levels")]
    LevelsInUse {
        num_levels: u8,
        level:      Level,
        file:       FileNumber,
    },
    #[error("the recorded level assignment is invalid: {0}")]
    InvalidLayout(Violation),
    #[error("could not recover the database: {0}")]
    Recover(RecoverError<FsError>),
    #[error("could not update the manifest: {0}")]
    Commit(CommitError<FsError>),
    #[error(transparent)]
    Table(TableError<FsError>),
    #[error("filesystem error: {0}")]
    Filesystem(FsError),
    #[error("sequence numbers are exhausted")]
    SequenceExhausted,
    /// Keys and values are stored with 32-bit lengths.
    #[error("a {key_len}-byte key with a {value_len}-byte value is too large to store")]
    EntryTooLarge {
        key_len:   usize,
        value_len: usize,
    },
}

impl<FsError, LockError: FSLockError> DbError<FsError, LockError> {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidOptions(_)
            | Self::NotFound(_)
            | Self::LevelsInUse { .. }
            | Self::SequenceExhausted
            | Self::EntryTooLarge { .. }        => ErrorKind::InvalidArgument,
            Self::Lock(err) if err.is_already_locked() => ErrorKind::Locked,
            Self::Lock(_) | Self::Unlock(_)     => ErrorKind::Io,
            Self::InvalidLayout(_)              => ErrorKind::Corruption,
            Self::Recover(err)                  => err.kind(),
            Self::Commit(_)                     => ErrorKind::CommitFailure,
            Self::Table(err)                    => err.kind(),
            Self::Filesystem(_)                 => ErrorKind::Io,
        }
    }
}


#[cfg(test)]
mod tests {
    use anchored_vfs::{Fault, FaultKind, MemoryFS};

    use super::*;


    fn dir() -> &'static Path {
        Path::new("/db")
    }

    fn open(fs: &MemoryFS, num_levels: u8, max_memtable_flush_level: u8) -> Database<MemoryFS> {
        let options = OpenOptions {
            max_memtable_flush_level,
            ..OpenOptions::with_num_levels(num_levels)
        };
        Database::open(fs.clone(), dir(), options).unwrap()
    }

    #[test]
    fn reads_see_newest_writes() {
        let fs = MemoryFS::new();
        let mut db = open(&fs, 4, 2);

        db.put(b"apple", b"red").unwrap();
        db.put(b"banana", b"yellow").unwrap();
        assert_eq!(db.get(b"apple").unwrap().as_deref(), Some(&b"red"[..]));

        db.flush_memtable().unwrap();
        db.put(b"apple", b"green").unwrap();
        db.delete(b"banana").unwrap();
        db.flush_memtable().unwrap();

        assert_eq!(db.get(b"apple").unwrap().as_deref(), Some(&b"green"[..]));
        assert_eq!(db.get(b"banana").unwrap(), None);
        assert_eq!(db.get(b"cherry").unwrap(), None);
        db.close().unwrap();

        let db = open(&fs, 4, 2);
        assert_eq!(db.get(b"apple").unwrap().as_deref(), Some(&b"green"[..]));
        assert_eq!(db.get(b"banana").unwrap(), None);
    }

    #[test]
    fn flushes_are_pushed_down_without_overlap() {
        let fs = MemoryFS::new();
        let mut db = open(&fs, 5, 3);

        db.put(b"m", b"1").unwrap();
        db.flush_memtable().unwrap();
        assert_eq!(db.level_assignment().file_counts(), [0, 0, 0, 1, 0]);

        // Overlaps the file at level 3, so it stops above it.
        db.put(b"m", b"2").unwrap();
        db.flush_memtable().unwrap();
        assert_eq!(db.level_assignment().file_counts(), [0, 0, 1, 1, 0]);

        // Overlaps the file at level 2, but not level 0 or 1.
        db.put(b"m", b"3").unwrap();
        db.flush_memtable().unwrap();
        assert_eq!(db.level_assignment().file_counts(), [0, 1, 1, 1, 0]);
        assert_eq!(db.get(b"m").unwrap().as_deref(), Some(&b"3"[..]));
    }

    #[test]
    fn flush_level_is_capped() {
        let fs = MemoryFS::new();
        let mut db = open(&fs, 3, 9);
        db.put(b"k", b"v").unwrap();
        db.flush_memtable().unwrap();
        assert_eq!(db.files_at_level(Level::new(2)), 1);

        drop(db);

        let mut db = open(&fs, 3, 0);
        db.put(b"z", b"v").unwrap();
        db.flush_memtable().unwrap();
        assert_eq!(db.files_at_level(Level::ZERO), 1);
    }

    #[test]
    fn opening_needs_existing_levels() {
        let fs = MemoryFS::new();
        let mut db = open(&fs, 4, 3);
        db.put(b"k", b"v").unwrap();
        db.close().unwrap();

        let err = Database::open(fs.clone(), dir(), OpenOptions::with_num_levels(3)).unwrap_err();
        assert!(matches!(err, DbError::LevelsInUse { num_levels: 3, .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        // More levels is fine, and is recorded.
        let db = open(&fs, 6, 0);
        assert_eq!(db.num_levels(), 6);
        assert_eq!(db.files_at_level(Level::new(3)), 1);
    }

    #[test]
    fn missing_database_is_not_created() {
        let fs = MemoryFS::new();
        let options = OpenOptions {
            create_if_missing: false,
            ..OpenOptions::default()
        };
        let err = Database::open(fs.clone(), dir(), options).unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = Database::open(fs, dir(), OpenOptions::with_num_levels(0)).unwrap_err();
        assert!(matches!(err, DbError::InvalidOptions(_)));
    }

    #[test]
    fn second_open_is_locked() {
        let fs = MemoryFS::new();
        let db = open(&fs, 4, 2);

        let err = Database::open(fs.clone(), dir(), OpenOptions::with_num_levels(4)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Locked);

        drop(db);
        assert!(Database::open(fs, dir(), OpenOptions::with_num_levels(4)).is_ok());
    }

    #[test]
    fn obsolete_files_are_removed() {
        let fs = MemoryFS::new();
        let mut db = open(&fs, 4, 2);
        db.put(b"k", b"v").unwrap();
        db.close().unwrap();

        fs.write_file(Path::new("/db/000099.ldb"), b"stray");
        fs.write_file(Path::new("/db/000098.dbtmp"), b"MANIFEST-000001\n");
        fs.write_file(Path::new("/db/MANIFEST-000097"), b"");

        let db = open(&fs, 4, 2);
        assert!(fs.read_file(Path::new("/db/000099.ldb")).is_none());
        assert!(fs.read_file(Path::new("/db/000098.dbtmp")).is_none());
        assert!(fs.read_file(Path::new("/db/MANIFEST-000097")).is_none());
        assert_eq!(db.get(b"k").unwrap().as_deref(), Some(&b"v"[..]));
    }

    #[test]
    fn failed_flush_keeps_writes() {
        let fs = MemoryFS::new();
        let mut db = open(&fs, 4, 2);
        db.put(b"k", b"v").unwrap();

        fs.inject_fault(Fault::new(FaultKind::Write, ".ldb"));
        let err = db.flush_memtable().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(db.level_assignment().total_files(), 0);
        assert_eq!(db.get(b"k").unwrap().as_deref(), Some(&b"v"[..]));

        fs.clear_faults();
        db.flush_memtable().unwrap();
        assert_eq!(db.level_assignment().total_files(), 1);
    }

    #[test]
    fn unsynced_flush_is_kept() {
        let fs = MemoryFS::new();
        open(&fs, 4, 2).close().unwrap();

        // A reopened database writes its next edit to a new manifest.
        let mut db = open(&fs, 4, 2);
        db.put(b"k", b"v").unwrap();
        fs.inject_fault(Fault::new(FaultKind::SyncDirectory, "db"));
        let err = db.flush_memtable().unwrap_err();
        fs.clear_faults();

        assert_eq!(err.kind(), ErrorKind::CommitFailure);
        assert!(matches!(err, DbError::Commit(CommitError::SyncDirectory(..))));
        assert_eq!(db.level_assignment().total_files(), 1);
        assert_eq!(db.get(b"k").unwrap().as_deref(), Some(&b"v"[..]));

        db.put(b"l", b"w").unwrap();
        db.close().unwrap();

        let db = open(&fs, 4, 2);
        assert_eq!(db.level_assignment().total_files(), 2);
        assert_eq!(db.get(b"k").unwrap().as_deref(), Some(&b"v"[..]));
        assert_eq!(db.get(b"l").unwrap().as_deref(), Some(&b"w"[..]));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn entry_lengths_are_limited() {
        assert!(fits_in_table(0));
        assert!(fits_in_table(u32::MAX as usize));
        assert!(!fits_in_table(u32::MAX as usize + 1));
    }
}
