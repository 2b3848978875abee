use std::collections::HashMap;

use thiserror::Error;

use crate::{file_tracking::Level, format::FileNumber, version::LevelAssignment};


/// Check that `assignment` is a valid layout for a database configured with `configured_levels`
/// levels:
///
/// - every file's smallest key and sequence number are no greater than its largest ones,
/// - no file number appears twice,
/// - no file sits at a level at or beyond `configured_levels`,
/// - at every level other than level 0, files are sorted by smallest key and have pairwise
///   disjoint key ranges.
///
/// The checks are performed in that order, and the first violation found is returned.
/// Level 0 may hold files with overlapping key ranges. Key ranges at different levels are not
/// compared.
pub fn validate(assignment: &LevelAssignment, configured_levels: u8) -> Result<(), Violation> {
    for (level, file) in assignment.iter_files() {
        if !file.is_well_formed() {
            return Err(Violation::MalformedRange {
                level,
                file: file.file_number(),
            });
        }
    }

    let mut seen = HashMap::new();
    for (level, file) in assignment.iter_files() {
        if let Some(first_level) = seen.insert(file.file_number(), level) {
            return Err(Violation::DuplicateFile {
                file:   file.file_number(),
                levels: (first_level, level),
            });
        }
    }

    if let Some(max_level) = assignment.max_occupied_level() {
        if max_level.inner() >= configured_levels {
            let file = assignment
                .files(max_level)
                .first()
                .map(|file| file.file_number())
                .unwrap_or(FileNumber(0));
            return Err(Violation::LevelOutOfRange {
                level: max_level,
                file,
                configured_levels,
            });
        }
    }

    for level in Level::all_levels(assignment.num_levels()).skip(1) {
        for pair in assignment.files(level).windows(2) {
            let [left, right] = pair else { continue };

            if left.smallest_user_key() > right.smallest_user_key() {
                return Err(Violation::Unsorted {
                    level,
                    first:  left.file_number(),
                    second: right.file_number(),
                });
            }
            if left.largest_user_key() >= right.smallest_user_key() {
                return Err(Violation::Overlap {
                    level,
                    first:  left.file_number(),
                    second: right.file_number(),
                });
            }
        }
    }

    Ok(())
}

/// A broken level invariant, naming the offending files and levels.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    #[error("file {file} at {level} has a smallest key or sequence number above its largest")]
    MalformedRange {
        level: Level,
        file:  FileNumber,
    },
    #[error("file {file} appears more than once (at {} and {})", levels.0, levels.1)]
    DuplicateFile {
        file:   FileNumber,
        levels: (Level, Level),
    },
    #[error(
        "file {file} is at {level}, but the database is configured with {configured_levels} levels",
    )]
    LevelOutOfRange {
        level:             Level,
        file:              FileNumber,
        configured_levels: u8,
    },
    #[error("files {first} and {second} at {level} are not sorted by smallest key")]
    Unsorted {
        level:  Level,
        first:  FileNumber,
        second: FileNumber,
    },
    #[error("files {first} and {second} at {level} have overlapping key ranges")]
    Overlap {
        level:  Level,
        first:  FileNumber,
        second: FileNumber,
    },
}
