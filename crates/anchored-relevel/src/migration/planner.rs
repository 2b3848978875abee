use std::{collections::HashSet, sync::Arc};

use thiserror::Error;
use tracing::{Level as LogLevel, event};

use crate::{
    file_tracking::{FileMetadata, Level},
    format::FileNumber,
    version::LevelAssignment,
};
use super::plan::{MigrationOp, MigrationPlan};


/// Work out how to bring `assignment` down to `target_num_levels` levels.
///
/// If no file sits at a level at or beyond the target, every file is kept where it is.
/// Otherwise, every file at or beyond the target ends up at the last remaining level,
/// `target_num_levels - 1`. A file there which does not overlap any other file headed there is
/// simply relabeled; files with overlapping key ranges, together with the overlapping files
/// already at the last remaining level, are merged. Files at lower levels are kept in place.
///
/// This does not read or write any table file, and does not validate `assignment`; the caller
/// should check it with [`validate`] first, since overlapping files at the last remaining level
/// would otherwise be merged together.
///
/// [`validate`]: crate::validate
pub fn plan(assignment: &LevelAssignment, target_num_levels: u8) -> Result<MigrationPlan, PlanError> {
    let Some(destination) = target_num_levels.checked_sub(1).map(Level::new) else {
        return Err(PlanError::TargetTooSmall);
    };

    let needs_moves = assignment
        .max_occupied_level()
        .is_some_and(|max_level| max_level >= Level::new(target_num_levels));

    let ops = if needs_moves {
        plan_moves(assignment, destination)
    } else {
        assignment
            .iter_files()
            .map(|(level, file)| MigrationOp::Relabel {
                file: file.file_number(),
                from: level,
                to:   level,
            })
            .collect()
    };

    let plan = MigrationPlan { target_num_levels, ops };
    check_convergence(assignment, &plan)?;

    event!(LogLevel::DEBUG, "{plan}");
    Ok(plan)
}

/// Files whose combined key range is `[smallest, largest]`, all bound for the same output.
struct Group {
    smallest: Vec<u8>,
    largest:  Vec<u8>,
    members:  Vec<(Level, Arc<FileMetadata>)>,
}

impl Group {
    fn new(level: Level, file: &Arc<FileMetadata>) -> Self {
        Self {
            smallest: file.smallest_user_key().to_vec(),
            largest:  file.largest_user_key().to_vec(),
            members:  vec![(level, Arc::clone(file))],
        }
    }

    fn overlaps(&self, file: &FileMetadata) -> bool {
        file.overlaps_range(&self.smallest, &self.largest)
    }

    fn absorb(&mut self, other: Self) {
        if other.smallest < self.smallest {
            self.smallest = other.smallest;
        }
        if other.largest > self.largest {
            self.largest = other.largest;
        }
        self.members.extend(other.members);
    }

    fn into_op(mut self, destination: Level) -> MigrationOp {
        if let [(level, file)] = self.members.as_slice() {
            MigrationOp::Relabel {
                file: file.file_number(),
                from: *level,
                to:   destination,
            }
        } else {
            self.members.sort_by_key(|(level, file)| (*level, file.file_number()));
            MigrationOp::Merge {
                inputs:       self.members
                    .iter()
                    .map(|(level, file)| (*level, file.file_number()))
                    .collect(),
                output_level: destination,
            }
        }
    }
}

fn plan_moves(assignment: &LevelAssignment, destination: Level) -> Vec<MigrationOp> {
    let mut groups = assignment
        .files(destination)
        .iter()
        .map(|file| Group::new(destination, file))
        .collect::<Vec<_>>();

    // Deeper levels first, so that merges proceed bottom-up.
    let max_level = assignment.max_occupied_level().unwrap_or(destination);
    for level in Level::new(destination.inner() + 1).inclusive_range(max_level).rev() {
        for file in assignment.files(level) {
            let mut group = Group::new(level, file);

            // Pull every overlapping group into the new one. Above level 0, the groups have
            // pairwise disjoint ranges, and absorbing overlapping groups preserves that.
            let mut index = 0;
            while let Some(existing) = groups.get(index) {
                if existing.overlaps(file) {
                    group.absorb(groups.swap_remove(index));
                } else {
                    index += 1;
                }
            }
            groups.push(group);
        }
    }

    groups.sort_by(|lhs, rhs| lhs.smallest.cmp(&rhs.smallest));

    let mut ops = Vec::with_capacity(assignment.total_files());
    for level in Level::all_levels(destination.inner()) {
        ops.extend(assignment.files(level).iter().map(|file| MigrationOp::Relabel {
            file: file.file_number(),
            from: level,
            to:   level,
        }));
    }
    ops.extend(groups.into_iter().map(|group| group.into_op(destination)));
    ops
}

/// Make sure that the plan consumes every file exactly once and leaves nothing at or beyond
/// the target level count.
fn check_convergence(assignment: &LevelAssignment, plan: &MigrationPlan) -> Result<(), PlanError> {
    let target = Level::new(plan.target_num_levels);
    let mut consumed = HashSet::new();

    for op in &plan.ops {
        for (level, file) in op.inputs() {
            if op.output_level() >= target {
                return Err(PlanError::DoesNotConverge {
                    target_num_levels: plan.target_num_levels,
                    file,
                    level,
                });
            }
            if !consumed.insert(file) {
                return Err(PlanError::Uncovered {
                    target_num_levels: plan.target_num_levels,
                    file,
                    level,
                });
            }
        }
    }

    for (level, file) in assignment.iter_files() {
        if !consumed.contains(&file.file_number()) {
            return Err(PlanError::Uncovered {
                target_num_levels: plan.target_num_levels,
                file: file.file_number(),
                level,
            });
        }
    }

    Ok(())
}

/// The target level count cannot be reached.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanError {
    #[error("target level count must be at least 1")]
    TargetTooSmall,
    #[error("a plan for {target_num_levels} levels would leave file {file} at {level}")]
    DoesNotConverge {
        target_num_levels: u8,
        file:              FileNumber,
        level:             Level,
    },
    #[error("a plan for {target_num_levels} levels does not handle file {file} at {level} exactly once")]
    Uncovered {
        target_num_levels: u8,
        file:              FileNumber,
        level:             Level,
    },
}
