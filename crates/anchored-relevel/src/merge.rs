use std::{collections::BTreeMap, error::Error as StdError, sync::Arc};
use std::path::{Path, PathBuf};
use std::fmt::{Debug, Formatter, Result as FmtResult};

use tracing::{Level as LogLevel, event};

use anchored_vfs::traits::{WritableFile, WritableFilesystem};

use crate::{
    database_files::DbFileName,
    file_tracking::{FileMetadata, FileNumberAllocator, Level},
    format::FileNumber,
    table_file::{Table, TableBuilder, TableEntry, TableError},
};


/// Combines several table files into new table files with pairwise disjoint key ranges.
///
/// Implementations must preserve every user key present in the inputs: for each key, the entry
/// with the greatest sequence number is kept, including deletion markers.
pub trait TableMerger {
    type Error: StdError;

    /// Write the merged contents of `inputs` to new table files destined for `output_level`,
    /// taking their numbers from `file_numbers`. The inputs are left untouched.
    ///
    /// On error, any output already written by this call must have been removed.
    fn merge(
        &mut self,
        inputs:       &[Arc<FileMetadata>],
        output_level: Level,
        file_numbers: &mut FileNumberAllocator,
    ) -> Result<Vec<FileMetadata>, Self::Error>;

    /// Remove the outputs of an earlier successful [`merge`] which will never be committed.
    ///
    /// [`merge`]: TableMerger::merge
    fn discard(&mut self, outputs: &[Arc<FileMetadata>]);
}

/// A [`TableMerger`] which reads and writes the table files of a database directory.
pub struct TableFileMerger<'a, FS> {
    filesystem:       &'a FS,
    db_directory:     &'a Path,
    /// Outputs are split once they reach this size.
    target_file_size: u64,
}

impl<'a, FS: WritableFilesystem> TableFileMerger<'a, FS> {
    #[must_use]
    pub const fn new(filesystem: &'a FS, db_directory: &'a Path, target_file_size: u64) -> Self {
        Self {
            filesystem,
            db_directory,
            target_file_size,
        }
    }

    fn write_outputs(
        &self,
        entries:      &BTreeMap<&[u8], &TableEntry>,
        file_numbers: &mut FileNumberAllocator,
        outputs:      &mut Vec<FileMetadata>,
        in_progress:  &mut Option<FileNumber>,
    ) -> Result<(), TableError<FS::Error>> {
        let mut builder: Option<TableBuilder<FS::WriteFile>> = None;

        for entry in entries.values() {
            if builder.is_none() {
                let file_number = file_numbers.allocate();
                *in_progress = Some(file_number);
                let file = self.filesystem
                    .open_writable(&self.table_path(file_number), false)
                    .map_err(|err| TableError::Create(file_number, err))?;
                builder = Some(TableBuilder::new(file_number, file));
            }
            let Some(current) = builder.as_mut() else { continue };

            current
                .add(&entry.user_key, entry.sequence, entry.entry_type, &entry.value)
                .map_err(|err| TableError::Write(current.file_number(), err))?;

            if current.estimated_size() >= self.target_file_size {
                if let Some(full) = builder.take() {
                    outputs.extend(finish_output(full)?);
                    *in_progress = None;
                }
            }
        }

        if let Some(last) = builder {
            outputs.extend(finish_output(last)?);
            *in_progress = None;
        }
        Ok(())
    }

    fn table_path(&self, file_number: FileNumber) -> PathBuf {
        DbFileName::Table { file_number }.file_path(self.db_directory)
    }

    fn delete_table(&self, file_number: FileNumber) {
        let path = self.table_path(file_number);
        if let Err(err) = self.filesystem.delete(&path) {
            event!(LogLevel::WARN, "could not delete table file {}: {err}", path.display());
        }
    }
}

fn finish_output<File: WritableFile, FsError>(
    builder: TableBuilder<File>,
) -> Result<Option<FileMetadata>, TableError<FsError>> {
    let file_number = builder.file_number();
    builder.finish().map_err(|err| TableError::Write(file_number, err))
}

impl<FS: WritableFilesystem> TableMerger for TableFileMerger<'_, FS> {
    type Error = TableError<FS::Error>;

    fn merge(
        &mut self,
        inputs:       &[Arc<FileMetadata>],
        output_level: Level,
        file_numbers: &mut FileNumberAllocator,
    ) -> Result<Vec<FileMetadata>, Self::Error> {
        let tables = inputs
            .iter()
            .map(|input| Table::open(
                self.filesystem,
                self.db_directory,
                input.file_number(),
                Some(input.file_size()),
            ))
            .collect::<Result<Vec<_>, _>>()?;

        let mut newest: BTreeMap<&[u8], &TableEntry> = BTreeMap::new();
        for entry in tables.iter().flat_map(Table::entries) {
            newest
                .entry(entry.user_key.as_slice())
                .and_modify(|kept| {
                    if kept.sequence < entry.sequence {
                        *kept = entry;
                    }
                })
                .or_insert(entry);
        }

        let mut outputs = Vec::new();
        let mut in_progress = None;
        if let Err(err) = self.write_outputs(&newest, file_numbers, &mut outputs, &mut in_progress) {
            for output in &outputs {
                self.delete_table(output.file_number());
            }
            if let Some(partial) = in_progress {
                self.delete_table(partial);
            }
            return Err(err);
        }

        event!(
            LogLevel::DEBUG,
            "merged {} tables ({} entries) into {} tables for {output_level}",
            inputs.len(),
            newest.len(),
            outputs.len(),
        );
        Ok(outputs)
    }

    fn discard(&mut self, outputs: &[Arc<FileMetadata>]) {
        for output in outputs {
            self.delete_table(output.file_number());
        }
    }
}

impl<FS> Debug for TableFileMerger<'_, FS> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("TableFileMerger")
            .field("filesystem",       &"<FS>")
            .field("db_directory",     &self.db_directory)
            .field("target_file_size", &self.target_file_size)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use anchored_vfs::{traits::ReadableFilesystem as _, Fault, FaultKind, MemoryFS};

    use crate::format::{EntryType, SequenceNumber};
    use super::*;


    const DIR: &str = "/db";

    fn seq(n: u64) -> SequenceNumber {
        SequenceNumber::new_usable(n).unwrap()
    }

    fn write_table(
        fs:          &MemoryFS,
        file_number: u64,
        entries:     &[(&[u8], u64, EntryType, &[u8])],
    ) -> Arc<FileMetadata> {
        let file = fs
            .open_writable(&DbFileName::Table { file_number: FileNumber(file_number) }
                .file_path(Path::new(DIR)), true)
            .unwrap();
        let mut builder = TableBuilder::new(FileNumber(file_number), file);
        for &(key, sequence, entry_type, value) in entries {
            builder.add(key, seq(sequence), entry_type, value).unwrap();
        }
        Arc::new(builder.finish().unwrap().unwrap())
    }

    #[test]
    fn newest_entry_wins_and_deletions_survive() {
        let fs = MemoryFS::new();
        let older = write_table(&fs, 1, &[
            (b"a", 1, EntryType::Value, b"old-a"),
            (b"b", 2, EntryType::Value, b"old-b"),
            (b"c", 3, EntryType::Value, b"c"),
        ]);
        let newer = write_table(&fs, 2, &[
            (b"a", 5, EntryType::Value, b"new-a"),
            (b"b", 6, EntryType::Deletion, b""),
        ]);

        let mut merger = TableFileMerger::new(&fs, Path::new(DIR), u64::MAX);
        let mut file_numbers = FileNumberAllocator::new(FileNumber(10));
        let outputs = merger.merge(&[older, newer], Level::new(1), &mut file_numbers).unwrap();

        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].file_number(), FileNumber(10));
        assert_eq!(outputs[0].smallest_user_key(), b"a");
        assert_eq!(outputs[0].largest_user_key(), b"c");

        let table = Table::open(&fs, Path::new(DIR), FileNumber(10), None).unwrap();
        let entries = table.entries()
            .iter()
            .map(|entry| (entry.user_key.clone(), entry.sequence.inner(), entry.entry_type))
            .collect::<Vec<_>>();
        assert_eq!(entries, [
            (b"a".to_vec(), 5, EntryType::Value),
            (b"b".to_vec(), 6, EntryType::Deletion),
            (b"c".to_vec(), 3, EntryType::Value),
        ]);
        assert!(fs.exists(Path::new("/db/000001.ldb")).unwrap());
    }

    #[test]
    fn outputs_are_split_by_size() {
        let fs = MemoryFS::new();
        let input = write_table(&fs, 1, &[
            (b"a", 1, EntryType::Value, &[0; 100]),
            (b"b", 2, EntryType::Value, &[0; 100]),
            (b"c", 3, EntryType::Value, &[0; 100]),
        ]);

        let mut merger = TableFileMerger::new(&fs, Path::new(DIR), 100);
        let mut file_numbers = FileNumberAllocator::new(FileNumber(5));
        let outputs = merger.merge(&[input], Level::new(2), &mut file_numbers).unwrap();

        assert_eq!(outputs.len(), 3);
        for pair in outputs.windows(2) {
            assert!(!pair[0].overlaps(&pair[1]));
        }
    }

    #[test]
    fn failed_merge_removes_partial_outputs() {
        let fs = MemoryFS::new();
        let input = write_table(&fs, 1, &[
            (b"a", 1, EntryType::Value, &[0; 100]),
            (b"b", 2, EntryType::Value, &[0; 100]),
        ]);
        fs.inject_fault(Fault::new(FaultKind::OpenWrite, "000006.ldb"));

        let mut merger = TableFileMerger::new(&fs, Path::new(DIR), 100);
        let mut file_numbers = FileNumberAllocator::new(FileNumber(5));
        assert!(matches!(
            merger.merge(&[input], Level::new(1), &mut file_numbers),
            Err(TableError::Create(FileNumber(6), _)),
        ));

        assert!(!fs.exists(Path::new("/db/000005.ldb")).unwrap());
        assert!(!fs.exists(Path::new("/db/000006.ldb")).unwrap());
        assert!(fs.exists(Path::new("/db/000001.ldb")).unwrap());
    }
}
