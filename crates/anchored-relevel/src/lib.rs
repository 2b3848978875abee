#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config_constants;

// On-disk formats
mod format;
mod database_files;
mod write_log;
mod table_file;

// Level metadata
mod file_tracking;
mod version;
mod manifest;
mod invariants;

// Engine pieces used by migrations and by `Database`
mod db_lock;
mod info_logger;
mod memtable;
mod merge;
mod table_cache;

mod migration;
mod reduce_levels;
mod database;

mod options;
mod error;


pub use self::{
    database::{Database, DatabaseError, DbError},
    database_files::SetCurrentError,
    error::ErrorKind,
    file_tracking::{FileMetadata, FileNumberAllocator, Level},
    format::{EntryType, FileNumber, SequenceNumber},
    info_logger::InfoLogLevelFilter,
    invariants::{Violation, validate},
    manifest::{CommitError, ManifestStore, RecoverError},
    merge::{TableFileMerger, TableMerger},
    migration::{
        ExecuteError, ExecutionOutcome, MigrationOp, MigrationPlan, PlanError, execute, plan,
    },
    options::{OpenOptions, ReduceLevelsOptions},
    reduce_levels::{
        ExecuteState, Migration, MigrationState, ReduceLevelsCommand, ReduceLevelsError,
        ReduceLevelsFsError, ReduceLevelsReport, reduce_levels, reduce_levels_with_merger,
    },
    table_file::TableError,
    version::{ApplyEditError, LevelAssignment},
};
