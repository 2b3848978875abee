use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

use crate::file_tracking::Level;
use crate::format::{FileNumber, SequenceNumber};
use super::{assignment::LevelAssignment, version_edit::VersionEdit};


/// Applies a sequence of [`VersionEdit`]s, as read from a `MANIFEST-_` file, to a base
/// [`LevelAssignment`].
#[derive(Debug)]
pub(crate) struct VersionBuilder {
    assignment:       LevelAssignment,
    live_files:       HashSet<FileNumber>,
    next_file_number: Option<FileNumber>,
    last_sequence:    Option<SequenceNumber>,
}

#[expect(unreachable_pub, reason = "control visibility at type definition")]
impl VersionBuilder {
    #[must_use]
    pub fn new(base: LevelAssignment) -> Self {
        let live_files = base.iter_files().map(|(_, file)| file.file_number()).collect();
        Self {
            assignment: base,
            live_files,
            next_file_number: None,
            last_sequence:    None,
        }
    }

    /// Applies the level count, then deletions, then additions.
    ///
    /// On error, the builder may have been partially updated and should be discarded.
    pub fn apply(&mut self, edit: &VersionEdit) -> Result<(), ApplyEditError> {
        if let Some(num_levels) = edit.num_levels {
            self.assignment
                .set_num_levels(num_levels)
                .map_err(|level| ApplyEditError::LevelsDropped { level, num_levels })?;
        }

        for &(level, file_number) in &edit.deleted_files {
            if self.assignment.remove_file(level, file_number).is_none() {
                return Err(ApplyEditError::MissingFile { level, file_number });
            }
            self.live_files.remove(&file_number);
        }

        for (level, file) in &edit.new_files {
            let file_number = file.file_number();
            if !self.live_files.insert(file_number) {
                return Err(ApplyEditError::DuplicateFile(file_number));
            }
            self.assignment
                .add_file(*level, Arc::clone(file))
                .map_err(|_| ApplyEditError::LevelOutOfRange {
                    level:      *level,
                    file_number,
                    num_levels: self.assignment.num_levels(),
                })?;
        }

        if let Some(next_file_number) = edit.next_file_number {
            self.next_file_number = Some(next_file_number);
        }
        if let Some(last_sequence) = edit.last_sequence {
            self.last_sequence = Some(last_sequence);
        }

        Ok(())
    }

    /// The resulting assignment, along with the last recorded next file number and last sequence
    /// number, if any edit recorded them.
    #[must_use]
    pub fn finish(self) -> (LevelAssignment, Option<FileNumber>, Option<SequenceNumber>) {
        (self.assignment, self.next_file_number, self.last_sequence)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyEditError {
    #[error("setting the level count to {num_levels} would drop the files at {level}")]
    LevelsDropped {
        level:      Level,
        num_levels: u8,
    },
    #[error("deleted file {file_number} is not present at {level}")]
    MissingFile {
        level:       Level,
        file_number: FileNumber,
    },
    #[error("file {0} was added twice")]
    DuplicateFile(FileNumber),
    #[error("file {file_number} was added at {level}, but there are only {num_levels} levels")]
    LevelOutOfRange {
        level:       Level,
        file_number: FileNumber,
        num_levels:  u8,
    },
}
