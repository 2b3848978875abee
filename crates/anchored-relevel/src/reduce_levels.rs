use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::Level as LogLevel;

use anchored_vfs::traits::{FSLockError, ReadableFilesystem, WritableFilesystem};

use crate::{
    database_files::{DbFileName, read_current},
    db_lock::DbLock,
    error::ErrorKind,
    info_logger::InfoLogger,
    invariants::{Violation, validate},
    manifest::{CommitError, ManifestStore, RecoverError},
    merge::{TableFileMerger, TableMerger},
    migration::{ExecuteError, PlanError, execute, plan},
    options::ReduceLevelsOptions,
    table_file::TableError,
};


/// The error type of [`reduce_levels`] on the filesystem `FS`, using the default merger.
pub type ReduceLevelsFsError<FS> = ReduceLevelsError<
    <FS as ReadableFilesystem>::Error,
    <FS as ReadableFilesystem>::LockError,
    TableError<<FS as ReadableFilesystem>::Error>,
>;

/// Bring the database in `db_directory` down to `options.target_num_levels` levels.
///
/// See [`Migration`] for details.
pub fn reduce_levels<FS: WritableFilesystem>(
    filesystem:   &FS,
    db_directory: &Path,
    options:      ReduceLevelsOptions,
) -> Result<ReduceLevelsReport, ReduceLevelsFsError<FS>> {
    Migration::new(options).run(filesystem, db_directory)
}

/// Like [`reduce_levels`], but merging files with the given `merger`.
pub fn reduce_levels_with_merger<FS: WritableFilesystem, M: TableMerger>(
    filesystem:   &FS,
    db_directory: &Path,
    options:      ReduceLevelsOptions,
    merger:       &mut M,
) -> Result<ReduceLevelsReport, ReduceLevelsError<FS::Error, FS::LockError, M::Error>> {
    Migration::new(options).run_with_merger(filesystem, db_directory, merger)
}

/// The progress of a [`Migration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationState {
    /// Not started, or stopped before any plan was made. The migration may be run.
    Idle,
    Planning,
    /// No plan could be made for the target.
    Infeasible,
    Planned,
    Executing,
    /// The new level assignment is durable.
    Committed,
    /// Executing or committing the plan failed; the previous level assignment is still in effect.
    Aborted,
}

impl MigrationState {
    /// Whether the migration has ended, successfully or not.
    #[inline]
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Infeasible | Self::Committed | Self::Aborted)
    }
}

/// An offline migration of a database to fewer levels.
///
/// Running the migration locks the database, reads its manifest, checks the level invariants,
/// and plans how to move every file at or beyond the target level count down to the last
/// remaining level (see [`plan`]). The plan is then executed (see [`execute`]), and the result is
/// committed by writing a new manifest and atomically switching `CURRENT` to it. Files replaced
/// by merges are deleted afterwards.
///
/// If the database already fits in the target number of levels, no file is touched, and only the
/// recorded level count is lowered (if it is above the target). The recorded level count is
/// never raised.
///
/// A failure before planning leaves the migration [`Idle`], so it may be run again. Otherwise,
/// it ends in one of the finished states, and running it again fails.
///
/// [`Idle`]: MigrationState::Idle
#[derive(Debug, Clone)]
pub struct Migration {
    options: ReduceLevelsOptions,
    state:   MigrationState,
}

impl Migration {
    #[inline]
    #[must_use]
    pub const fn new(options: ReduceLevelsOptions) -> Self {
        Self {
            options,
            state: MigrationState::Idle,
        }
    }

    #[inline]
    #[must_use]
    pub const fn state(&self) -> MigrationState {
        self.state
    }

    #[inline]
    #[must_use]
    pub const fn options(&self) -> &ReduceLevelsOptions {
        &self.options
    }

    /// Change the target level count. Only possible while [`Idle`].
    ///
    /// [`Idle`]: MigrationState::Idle
    pub fn set_target_num_levels(&mut self, target_num_levels: u8) -> Result<(), MigrationState> {
        if self.state == MigrationState::Idle {
            self.options.target_num_levels = target_num_levels;
            Ok(())
        } else {
            Err(self.state)
        }
    }

    pub fn run<FS: WritableFilesystem>(
        &mut self,
        filesystem:   &FS,
        db_directory: &Path,
    ) -> Result<ReduceLevelsReport, ReduceLevelsFsError<FS>> {
        let mut merger = TableFileMerger::new(
            filesystem,
            db_directory,
            self.options.target_file_size,
        );
        self.run_with_merger(filesystem, db_directory, &mut merger)
    }

    pub fn run_with_merger<FS: WritableFilesystem, M: TableMerger>(
        &mut self,
        filesystem:   &FS,
        db_directory: &Path,
        merger:       &mut M,
    ) -> Result<ReduceLevelsReport, ReduceLevelsError<FS::Error, FS::LockError, M::Error>> {
        if self.state != MigrationState::Idle {
            return Err(ReduceLevelsError::AlreadyRun(self.state));
        }
        let target_num_levels = self.options.target_num_levels;
        if target_num_levels < 1 {
            return Err(ReduceLevelsError::InvalidTarget(target_num_levels));
        }

        // Nothing, not even a `LOCK` file, is created in a directory without a database.
        // `recover` looks for `CURRENT` again once the lock is held.
        if matches!(read_current(filesystem, db_directory), Ok(None)) {
            return Err(ReduceLevelsError::NotFound(db_directory.to_owned()));
        }

        let lock = DbLock::acquire(filesystem, db_directory).map_err(|err| {
            if err.is_not_found() {
                ReduceLevelsError::NotFound(db_directory.to_owned())
            } else {
                ReduceLevelsError::Lock(err)
            }
        })?;

        let mut manifest = ManifestStore::recover(filesystem, db_directory).map_err(|err| match err {
            RecoverError::NotFound(path) => ReduceLevelsError::NotFound(path),
            err                          => ReduceLevelsError::Recover(err),
        })?;
        let mut info_logger = InfoLogger::open(filesystem, db_directory, self.options.info_log_filter);

        let before = manifest.current_assignment().clone();
        let old_num_levels = before.num_levels();
        let files_per_level_before = before.file_counts();
        if self.options.print_old_levels {
            info_logger.log(
                LogLevel::INFO,
                &format!("Old levels: {}", describe_levels(&files_per_level_before)),
            );
        }
        validate(&before, old_num_levels).map_err(ReduceLevelsError::InvalidLayout)?;

        self.state = MigrationState::Planning;
        let plan = match plan(&before, target_num_levels) {
            Ok(plan) => plan,
            Err(err) => {
                self.state = MigrationState::Infeasible;
                info_logger.log(LogLevel::ERROR, &format!("cannot reduce levels: {err}"));
                return Err(ReduceLevelsError::Plan(err));
            }
        };
        self.state = MigrationState::Planned;

        if target_num_levels >= old_num_levels {
            // Everything already fits, and the level count is never raised.
            self.state = MigrationState::Committed;
            info_logger.log(LogLevel::INFO, &format!(
                "database already has {old_num_levels} levels, not reducing to {target_num_levels}",
            ));
            return Ok(ReduceLevelsReport {
                old_num_levels,
                new_num_levels: old_num_levels,
                files_per_level_after: files_per_level_before.clone(),
                files_per_level_before,
                num_merges:    0,
                num_moves:     0,
                files_written: 0,
                files_removed: 0,
            });
        }

        info_logger.log(LogLevel::INFO, &format!(
            "reducing from {old_num_levels} to {target_num_levels} levels: {plan}",
        ));

        self.state = MigrationState::Executing;
        let mut file_numbers = manifest.file_number_allocator();
        let outcome = match execute(&plan, &before, merger, &mut file_numbers) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.state = MigrationState::Aborted;
                info_logger.log(LogLevel::ERROR, &format!("migration aborted: {err}"));
                return Err(ReduceLevelsError::Execute(err));
            }
        };

        let files_per_level_after = outcome.assignment.file_counts();
        let commit = manifest.commit_assignment(
            filesystem,
            outcome.assignment,
            file_numbers.next_file_number(),
        );
        if let Err(err) = commit {
            self.state = MigrationState::Aborted;
            // After a directory sync failure, `CURRENT` may already name the new manifest,
            // whose files must then be kept.
            if !matches!(err, CommitError::SyncDirectory(..)) {
                merger.discard(&outcome.created);
            }
            info_logger.log(LogLevel::ERROR, &format!("could not commit the migration: {err}"));
            return Err(ReduceLevelsError::Commit(err));
        }
        self.state = MigrationState::Committed;

        let mut files_removed = 0;
        for file in &outcome.superseded {
            let path = DbFileName::Table { file_number: file.file_number() }.file_path(db_directory);
            match filesystem.delete(&path) {
                Ok(()) => files_removed += 1,
                Err(err) => info_logger.log(
                    LogLevel::WARN,
                    &format!("could not delete superseded table {}: {err}", path.display()),
                ),
            }
        }

        let report = ReduceLevelsReport {
            old_num_levels,
            new_num_levels: target_num_levels,
            files_per_level_before,
            files_per_level_after,
            num_merges:    plan.num_merges(),
            num_moves:     plan.num_moves(),
            files_written: outcome.created.len(),
            files_removed,
        };
        info_logger.log(LogLevel::INFO, &format!(
            "committed manifest {}. New levels: {}",
            manifest.manifest_number(),
            describe_levels(&report.files_per_level_after),
        ));

        drop(lock);
        Ok(report)
    }
}

fn describe_levels(files_per_level: &[usize]) -> String {
    let mut description = String::new();
    for (level, count) in files_per_level.iter().enumerate() {
        if level > 0 {
            description.push_str(", ");
        }
        description.push_str(&format!("L{level}: {count}"));
    }
    description
}

/// What a successful [`reduce_levels`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceLevelsReport {
    pub old_num_levels:         u8,
    pub new_num_levels:         u8,
    /// The number of files at each level, from level 0 upwards.
    pub files_per_level_before: Vec<usize>,
    pub files_per_level_after:  Vec<usize>,
    pub num_merges:             usize,
    /// Files relabeled to another level without being rewritten.
    pub num_moves:              usize,
    pub files_written:          usize,
    /// Superseded table files which were deleted. Any others are deleted the next time the
    /// database is opened.
    pub files_removed:          usize,
}

impl ReduceLevelsReport {
    #[must_use]
    pub fn files_at_level(&self, level: u8) -> usize {
        self.files_per_level_after
            .get(usize::from(level))
            .copied()
            .unwrap_or(0)
    }

    /// Whether no file was moved or rewritten.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.num_merges == 0 && self.num_moves == 0
    }
}

impl Display for ReduceLevelsReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "reduced from {} to {} levels ({} merges, {} moves). New levels: {}",
            self.old_num_levels,
            self.new_num_levels,
            self.num_merges,
            self.num_moves,
            describe_levels(&self.files_per_level_after),
        )
    }
}

#[derive(Error, Debug)]
pub enum ReduceLevelsError<FsError, LockError, MergeError> {
    #[error("target level count must be at least 1, not {0}")]
    InvalidTarget(u8),
    #[error("no database in {}; a migration never creates one", .0.display())]
    NotFound(PathBuf),
    #[error("this migration was already run, and is {0:?}")]
    AlreadyRun(MigrationState),
    #[error("could not lock the database: {0}")]
    Lock(LockError),
    #[error("could not read the level assignment: {0}")]
    Recover(RecoverError<FsError>),
    #[error("the current level assignment is invalid: {0}")]
    InvalidLayout(Violation),
    #[error("cannot reduce levels: {0}")]
    Plan(PlanError),
    #[error("migration failed: {0}")]
    Execute(ExecuteError<MergeError>),
    #[error("could not commit the new level assignment: {0}")]
    Commit(CommitError<FsError>),
}

impl<FsError, LockError: FSLockError, MergeError> ReduceLevelsError<FsError, LockError, MergeError> {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTarget(_)
            | Self::NotFound(_)
            | Self::AlreadyRun(_)                 => ErrorKind::InvalidArgument,
            Self::Lock(err) if err.is_already_locked() => ErrorKind::Locked,
            Self::Lock(_)                         => ErrorKind::Io,
            Self::Recover(err)                    => err.kind(),
            Self::InvalidLayout(_)                => ErrorKind::Corruption,
            Self::Plan(_)                         => ErrorKind::InfeasibleTarget,
            Self::Execute(
                ExecuteError::Merge { .. } | ExecuteError::Invalid(_),
            )                                     => ErrorKind::MergeFailure,
            Self::Execute(_)                      => ErrorKind::InfeasibleTarget,
            Self::Commit(_)                       => ErrorKind::CommitFailure,
        }
    }
}

/// The outcome of a [`ReduceLevelsCommand`]: success or failure, with a message for the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteState {
    Succeed(String),
    Failed(String),
}

impl ExecuteState {
    #[inline]
    #[must_use]
    pub const fn is_succeed(&self) -> bool {
        matches!(self, Self::Succeed(_))
    }

    #[inline]
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Succeed(message) | Self::Failed(message) => message,
        }
    }
}

/// Runs [`reduce_levels`] and reduces its result to an [`ExecuteState`], for operator tooling
/// which only reports success or failure.
#[derive(Debug, Clone)]
pub struct ReduceLevelsCommand<'a, FS> {
    filesystem:   &'a FS,
    db_directory: &'a Path,
    options:      ReduceLevelsOptions,
}

impl<'a, FS: WritableFilesystem> ReduceLevelsCommand<'a, FS> {
    #[inline]
    #[must_use]
    pub const fn new(
        filesystem:   &'a FS,
        db_directory: &'a Path,
        options:      ReduceLevelsOptions,
    ) -> Self {
        Self {
            filesystem,
            db_directory,
            options,
        }
    }

    #[must_use]
    pub fn run(&self) -> ExecuteState {
        match reduce_levels(self.filesystem, self.db_directory, self.options) {
            Ok(report) => ExecuteState::Succeed(report.to_string()),
            Err(err)   => {
                tracing::event!(LogLevel::ERROR, "reduce levels failed ({:?}): {err}", err.kind());
                ExecuteState::Failed(err.to_string())
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use anchored_vfs::MemoryFS;

    use crate::{Database, OpenOptions, file_tracking::Level};
    use super::*;


    fn dir() -> &'static Path {
        Path::new("/db")
    }

    #[test]
    fn zero_target_is_rejected_before_io() {
        let fs = MemoryFS::new();
        let mut migration = Migration::new(ReduceLevelsOptions::new(0));
        let err = migration.run(&fs, dir()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.to_string(), "target level count must be at least 1, not 0");
        assert_eq!(migration.state(), MigrationState::Idle);
        assert!(!fs.exists(dir()).unwrap());

        // Still idle, so the target may be fixed and the migration retried.
        migration.set_target_num_levels(2).unwrap();
        assert_eq!(migration.run(&fs, dir()).unwrap_err().kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn finished_migration_cannot_rerun() {
        let fs = MemoryFS::new();
        let mut db = Database::open(fs.clone(), dir(), OpenOptions::with_num_levels(4)).unwrap();
        db.put(b"k", b"v").unwrap();
        db.close().unwrap();

        let mut migration = Migration::new(ReduceLevelsOptions::new(2));
        let report = migration.run(&fs, dir()).unwrap();
        assert_eq!(migration.state(), MigrationState::Committed);
        assert_eq!(report.new_num_levels, 2);
        assert_eq!(report.files_at_level(1), 1);

        let err = migration.run(&fs, dir()).unwrap_err();
        assert!(matches!(err, ReduceLevelsError::AlreadyRun(MigrationState::Committed)));
        assert_eq!(migration.set_target_num_levels(1), Err(MigrationState::Committed));
    }

    #[test]
    fn command_reports_success_or_failure() {
        let fs = MemoryFS::new();
        let db = Database::open(fs.clone(), dir(), OpenOptions::with_num_levels(4)).unwrap();
        assert_eq!(db.files_at_level(Level::ZERO), 0);
        db.close().unwrap();

        let state = ReduceLevelsCommand::new(&fs, dir(), ReduceLevelsOptions::new(3)).run();
        assert!(state.is_succeed(), "{}", state.message());

        let state = ReduceLevelsCommand::new(&fs, dir(), ReduceLevelsOptions::new(0)).run();
        assert!(state.is_failed());
        assert!(state.message().contains("at least 1"));
    }

    #[test]
    fn old_levels_are_described() {
        assert_eq!(describe_levels(&[0, 2, 1]), "L0: 0, L1: 2, L2: 1");
    }
}
