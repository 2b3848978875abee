use std::sync::Arc;

use crate::file_tracking::{FileMetadata, Level};
use crate::format::{FileNumber, SequenceNumber};
use super::version_edit::VersionEdit;


/// The set of live table files of a database, together with the level each one belongs to.
///
/// Files at level 0 are kept in increasing order of file number, which is also the order in
/// which they were flushed. Files at every other level are kept sorted by smallest user key
/// (ties broken by file number); whether their key ranges are actually disjoint is checked by
/// [`validate`], not enforced here.
///
/// [`validate`]: crate::validate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelAssignment {
    /// Has length `num_levels`.
    levels: Vec<Vec<Arc<FileMetadata>>>,
}

impl LevelAssignment {
    #[must_use]
    pub fn new_empty(num_levels: u8) -> Self {
        Self {
            levels: vec![Vec::new(); usize::from(num_levels)],
        }
    }

    #[must_use]
    pub fn num_levels(&self) -> u8 {
        #[expect(clippy::unwrap_used, reason = "`levels` is only ever created with a u8 length")]
        u8::try_from(self.levels.len()).unwrap()
    }

    /// The files at `level`, in the order described on [`LevelAssignment`].
    ///
    /// Levels at or beyond [`num_levels`] have no files.
    ///
    /// [`num_levels`]: LevelAssignment::num_levels
    #[must_use]
    pub fn files(&self, level: Level) -> &[Arc<FileMetadata>] {
        self.levels.get(level.index()).map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn files_at_level(&self, level: Level) -> usize {
        self.files(level).len()
    }

    /// The number of files at each level, from level 0 upwards.
    #[must_use]
    pub fn file_counts(&self) -> Vec<usize> {
        self.levels.iter().map(Vec::len).collect()
    }

    #[must_use]
    pub fn total_files(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    /// The greatest level holding at least one file, or `None` if there are no files.
    #[must_use]
    pub fn max_occupied_level(&self) -> Option<Level> {
        Level::all_levels(self.num_levels())
            .rev()
            .find(|&level| self.files_at_level(level) > 0)
    }

    /// Iterate over every file, from level 0 upwards.
    pub fn iter_files(&self) -> impl Iterator<Item = (Level, &Arc<FileMetadata>)> {
        Level::all_levels(self.num_levels())
            .flat_map(|level| self.files(level).iter().map(move |file| (level, file)))
    }

    #[must_use]
    pub fn find_file(&self, file_number: FileNumber) -> Option<(Level, &Arc<FileMetadata>)> {
        self.iter_files().find(|(_, file)| file.file_number() == file_number)
    }

    /// Insert a file at the given level, maintaining the sort order of that level.
    ///
    /// Returns the file back if `level` is not below [`num_levels`].
    ///
    /// [`num_levels`]: LevelAssignment::num_levels
    pub fn add_file(
        &mut self,
        level: Level,
        file:  Arc<FileMetadata>,
    ) -> Result<(), Arc<FileMetadata>> {
        let Some(files) = self.levels.get_mut(level.index()) else {
            return Err(file);
        };

        let position = if level == Level::ZERO {
            files.partition_point(|other| other.file_number() < file.file_number())
        } else {
            files.partition_point(|other| {
                (other.smallest_user_key(), other.file_number())
                    < (file.smallest_user_key(), file.file_number())
            })
        };
        files.insert(position, file);
        Ok(())
    }

    pub fn remove_file(
        &mut self,
        level:       Level,
        file_number: FileNumber,
    ) -> Option<Arc<FileMetadata>> {
        let files = self.levels.get_mut(level.index())?;
        let position = files.iter().position(|file| file.file_number() == file_number)?;
        Some(files.remove(position))
    }

    /// Change the number of levels.
    ///
    /// Returns the first occupied level that would be dropped, if shrinking would drop any file.
    pub fn set_num_levels(&mut self, num_levels: u8) -> Result<(), Level> {
        if let Some(max_level) = self.max_occupied_level() {
            if max_level.inner() >= num_levels {
                return Err(max_level);
            }
        }
        self.levels.resize_with(usize::from(num_levels), Vec::new);
        Ok(())
    }

    /// A version edit which, applied to an empty state, produces this assignment.
    #[must_use]
    pub(crate) fn snapshot_edit(
        &self,
        next_file_number: FileNumber,
        last_sequence:    SequenceNumber,
    ) -> VersionEdit {
        let mut edit = VersionEdit::new_empty();
        edit.num_levels = Some(self.num_levels());
        edit.next_file_number = Some(next_file_number);
        edit.last_sequence = Some(last_sequence);
        edit.new_files = self.iter_files()
            .map(|(level, file)| (level, Arc::clone(file)))
            .collect();
        edit
    }
}
