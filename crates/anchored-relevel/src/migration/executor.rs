use std::{collections::HashMap, sync::Arc};

use thiserror::Error;
use tracing::{Level as LogLevel, event};

use crate::{
    file_tracking::{FileMetadata, FileNumberAllocator, Level},
    format::FileNumber,
    invariants::{Violation, validate},
    merge::TableMerger,
    version::LevelAssignment,
};
use super::plan::{MigrationOp, MigrationPlan};


/// The result of running every operation of a [`MigrationPlan`], not yet committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// The new level assignment, with exactly the target number of levels.
    pub assignment: LevelAssignment,
    /// Files consumed by merges, which are no longer referenced by `assignment`.
    pub superseded: Vec<Arc<FileMetadata>>,
    /// Files written by merges.
    pub created:    Vec<Arc<FileMetadata>>,
}

/// Run `plan` against `current`, the assignment it was made from.
///
/// Relabels only change metadata. Merges write new table files through `merger`, taking file
/// numbers from `file_numbers`. Nothing is committed: if an error is returned, every file written
/// by the merges of this call has been discarded, and `current` is untouched.
///
/// The plan is checked to consume every file of `current` exactly once before any merge runs,
/// and the resulting assignment is checked with [`validate`] before it is returned.
pub fn execute<M: TableMerger>(
    plan:         &MigrationPlan,
    current:      &LevelAssignment,
    merger:       &mut M,
    file_numbers: &mut FileNumberAllocator,
) -> Result<ExecutionOutcome, ExecuteError<M::Error>> {
    let files = resolve_inputs(plan, current)?;

    let mut assignment = LevelAssignment::new_empty(plan.target_num_levels());
    let mut superseded = Vec::new();
    let mut created: Vec<Arc<FileMetadata>> = Vec::new();

    for op in plan.ops() {
        match op {
            MigrationOp::Relabel { file, from, to } => {
                let Some(metadata) = files.get(file) else { continue };
                if let Err(metadata) = assignment.add_file(*to, Arc::clone(metadata)) {
                    merger.discard(&created);
                    return Err(ExecuteError::LevelOutOfRange {
                        file:              metadata.file_number(),
                        level:             *to,
                        target_num_levels: plan.target_num_levels(),
                    });
                }
                if from != to {
                    event!(LogLevel::INFO, "moved {file} from {from} to {to}");
                }
            }
            MigrationOp::Merge { inputs, output_level } => {
                let input_files = inputs
                    .iter()
                    .filter_map(|(_, file)| files.get(file).map(Arc::clone))
                    .collect::<Vec<_>>();

                let outputs = match merger.merge(&input_files, *output_level, file_numbers) {
                    Ok(outputs) => outputs,
                    Err(source) => {
                        merger.discard(&created);
                        return Err(ExecuteError::Merge {
                            output_level: *output_level,
                            inputs:       inputs.iter().map(|&(_, file)| file).collect(),
                            source,
                        });
                    }
                };

                event!(
                    LogLevel::INFO,
                    "{op}: wrote {} files",
                    outputs.len(),
                );

                for output in outputs {
                    let output = Arc::new(output);
                    created.push(Arc::clone(&output));
                    if let Err(output) = assignment.add_file(*output_level, output) {
                        merger.discard(&created);
                        return Err(ExecuteError::LevelOutOfRange {
                            file:              output.file_number(),
                            level:             *output_level,
                            target_num_levels: plan.target_num_levels(),
                        });
                    }
                }
                superseded.extend(input_files);
            }
        }
    }

    if let Err(violation) = validate(&assignment, plan.target_num_levels()) {
        merger.discard(&created);
        return Err(ExecuteError::Invalid(violation));
    }

    Ok(ExecutionOutcome {
        assignment,
        superseded,
        created,
    })
}

/// Map every file number named by the plan to its metadata, checking that the plan consumes each
/// file of `current` exactly once, at the level it is actually at.
fn resolve_inputs<MergeError>(
    plan:    &MigrationPlan,
    current: &LevelAssignment,
) -> Result<HashMap<FileNumber, Arc<FileMetadata>>, ExecuteError<MergeError>> {
    let mut files = HashMap::new();

    for op in plan.ops() {
        for (level, file) in op.inputs() {
            let metadata = current
                .files(level)
                .iter()
                .find(|metadata| metadata.file_number() == file)
                .ok_or(ExecuteError::UnknownFile { file, level })?;

            if files.insert(file, Arc::clone(metadata)).is_some() {
                return Err(ExecuteError::ConsumedTwice(file));
            }
        }
    }

    if let Some((level, file)) = current
        .iter_files()
        .find(|(_, file)| !files.contains_key(&file.file_number()))
    {
        return Err(ExecuteError::Uncovered {
            file: file.file_number(),
            level,
        });
    }

    Ok(files)
}

#[derive(Error, Debug)]
pub enum ExecuteError<MergeError> {
    #[error("the plan names file {file} at {level}, which is not there")]
    UnknownFile {
        file:  FileNumber,
        level: Level,
    },
    #[error("the plan consumes file {0} more than once")]
    ConsumedTwice(FileNumber),
    #[error("the plan does not handle file {file} at {level}")]
    Uncovered {
        file:  FileNumber,
        level: Level,
    },
    #[error("the plan puts file {file} at {level}, but only {target_num_levels} levels remain")]
    LevelOutOfRange {
        file:              FileNumber,
        level:             Level,
        target_num_levels: u8,
    },
    #[error("merging files {inputs:?} into {output_level} failed: {source}")]
    Merge {
        output_level: Level,
        inputs:       Vec<FileNumber>,
        source:       MergeError,
    },
    #[error("the migrated level assignment is invalid: {0}")]
    Invalid(Violation),
}


#[cfg(test)]
mod tests {
    use std::{convert::Infallible, fmt::{Display, Formatter, Result as FmtResult}};
    use std::error::Error as StdError;

    use crate::{format::SequenceNumber, migration::plan};
    use super::*;


    fn table(number: u64, smallest: &[u8], largest: &[u8]) -> Arc<FileMetadata> {
        Arc::new(FileMetadata::new(
            FileNumber(number),
            1,
            smallest,
            largest,
            SequenceNumber::ZERO,
            SequenceNumber::ZERO,
        ))
    }

    fn layout() -> LevelAssignment {
        let mut assignment = LevelAssignment::new_empty(4);
        assignment.add_file(Level::ZERO, table(1, b"a", b"z")).unwrap();
        assignment.add_file(Level::new(1), table(2, b"a", b"c")).unwrap();
        assignment.add_file(Level::new(2), table(3, b"b", b"e")).unwrap();
        assignment.add_file(Level::new(3), table(4, b"x", b"y")).unwrap();
        assignment.add_file(Level::new(3), table(5, b"d", b"f")).unwrap();
        assignment
    }

    #[derive(Debug)]
    struct MergeFailed;

    impl Display for MergeFailed {
        fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
            write!(f, "merge failed")
        }
    }

    impl StdError for MergeFailed {}

    /// Produces one output spanning all inputs, and fails the merge numbered `fail_at`, if any.
    #[derive(Default)]
    struct FakeMerger {
        merges:    usize,
        fail_at:   Option<usize>,
        discarded: Vec<FileNumber>,
    }

    impl TableMerger for FakeMerger {
        type Error = MergeFailed;

        fn merge(
            &mut self,
            inputs:       &[Arc<FileMetadata>],
            _output_level: Level,
            file_numbers: &mut FileNumberAllocator,
        ) -> Result<Vec<FileMetadata>, Self::Error> {
            let merge_index = self.merges;
            self.merges += 1;
            if self.fail_at == Some(merge_index) {
                return Err(MergeFailed);
            }

            let smallest = inputs.iter().map(|file| file.smallest_user_key()).min().unwrap();
            let largest = inputs.iter().map(|file| file.largest_user_key()).max().unwrap();
            Ok(vec![FileMetadata::new(
                file_numbers.allocate(),
                u64::try_from(inputs.len()).unwrap(),
                smallest,
                largest,
                SequenceNumber::ZERO,
                SequenceNumber::ZERO,
            )])
        }

        fn discard(&mut self, outputs: &[Arc<FileMetadata>]) {
            self.discarded.extend(outputs.iter().map(|file| file.file_number()));
        }
    }

    /// Never asked to merge anything.
    struct NoMerges;

    impl TableMerger for NoMerges {
        type Error = Infallible;

        fn merge(
            &mut self,
            _inputs:       &[Arc<FileMetadata>],
            _output_level: Level,
            _file_numbers: &mut FileNumberAllocator,
        ) -> Result<Vec<FileMetadata>, Self::Error> {
            panic!("unexpected merge");
        }

        fn discard(&mut self, _outputs: &[Arc<FileMetadata>]) {}
    }

    fn numbers(files: &[Arc<FileMetadata>]) -> Vec<u64> {
        files.iter().map(|file| file.file_number().0).collect()
    }

    #[test]
    fn merges_and_relabels() {
        let current = layout();
        let plan = plan(&current, 2).unwrap();
        let mut merger = FakeMerger::default();
        let mut file_numbers = FileNumberAllocator::new(FileNumber(10));

        let outcome = execute(&plan, &current, &mut merger, &mut file_numbers).unwrap();

        assert_eq!(outcome.assignment.file_counts(), [1, 2]);
        assert_eq!(numbers(outcome.assignment.files(Level::new(1))), [10, 4]);
        assert_eq!(numbers(&outcome.created), [10]);
        let mut superseded = numbers(&outcome.superseded);
        superseded.sort_unstable();
        assert_eq!(superseded, [2, 3, 5]);
        assert_eq!(file_numbers.next_file_number(), FileNumber(11));
        assert!(merger.discarded.is_empty());
    }

    #[test]
    fn noop_plan_only_relabels() {
        let current = layout();
        let plan = plan(&current, 4).unwrap();
        let mut file_numbers = FileNumberAllocator::new(FileNumber(10));

        let outcome = execute(&plan, &current, &mut NoMerges, &mut file_numbers).unwrap();
        assert_eq!(outcome.assignment, current);
        assert!(outcome.created.is_empty() && outcome.superseded.is_empty());
    }

    #[test]
    fn failed_merge_discards_earlier_outputs() {
        let mut current = layout();
        current.add_file(Level::new(3), table(6, b"p", b"q")).unwrap();
        current.add_file(Level::new(2), table(7, b"p", b"p")).unwrap();
        let plan = plan(&current, 2).unwrap();
        assert_eq!(plan.num_merges(), 2);

        let mut merger = FakeMerger { fail_at: Some(1), ..FakeMerger::default() };
        let mut file_numbers = FileNumberAllocator::new(FileNumber(10));
        let err = execute(&plan, &current, &mut merger, &mut file_numbers).unwrap_err();

        assert!(matches!(err, ExecuteError::Merge { output_level, .. } if output_level == Level::new(1)));
        assert_eq!(merger.discarded, [FileNumber(10)]);
    }

    #[test]
    fn plan_must_match_assignment() {
        let current = layout();
        let plan = plan(&current, 2).unwrap();

        let mut other = current.clone();
        other.add_file(Level::ZERO, table(9, b"a", b"b")).unwrap();
        let mut file_numbers = FileNumberAllocator::new(FileNumber(10));
        assert!(matches!(
            execute(&plan, &other, &mut NoMerges, &mut file_numbers),
            Err(ExecuteError::Uncovered { file: FileNumber(9), .. }),
        ));

        let mut moved = LevelAssignment::new_empty(4);
        for (level, file) in current.iter_files() {
            let level = if file.file_number() == FileNumber(4) { Level::new(2) } else { level };
            moved.add_file(level, Arc::clone(file)).unwrap();
        }
        assert!(matches!(
            execute(&plan, &moved, &mut NoMerges, &mut file_numbers),
            Err(ExecuteError::UnknownFile { file: FileNumber(4), .. }),
        ));
    }
}
