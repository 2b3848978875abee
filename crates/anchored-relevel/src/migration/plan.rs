use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::{file_tracking::Level, format::FileNumber};


/// One step of a [`MigrationPlan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOp {
    /// Move a file to another level without touching its contents. If `from == to`, the file is
    /// left where it is.
    Relabel {
        file: FileNumber,
        from: Level,
        to:   Level,
    },
    /// Merge several files into new files at `output_level`. The inputs are listed in order of
    /// level, then file number.
    Merge {
        inputs:       Vec<(Level, FileNumber)>,
        output_level: Level,
    },
}

impl MigrationOp {
    /// Whether this operation leaves a file exactly where it already is.
    #[inline]
    #[must_use]
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Relabel { from, to, .. } if from == to)
    }

    /// The level at which the files produced by this operation end up.
    #[inline]
    #[must_use]
    pub const fn output_level(&self) -> Level {
        match self {
            Self::Relabel { to, .. }          => *to,
            Self::Merge { output_level, .. }  => *output_level,
        }
    }

    /// The current files which this operation consumes, with their current levels.
    pub fn inputs(&self) -> impl Iterator<Item = (Level, FileNumber)> + '_ {
        let (single, merged) = match self {
            Self::Relabel { file, from, .. } => (Some((*from, *file)), &[][..]),
            Self::Merge { inputs, .. }       => (None, inputs.as_slice()),
        };
        single.into_iter().chain(merged.iter().copied())
    }
}

impl Display for MigrationOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Relabel { file, from, to } if from == to => write!(f, "keep {file} at {to}"),
            Self::Relabel { file, from, to } => write!(f, "move {file} from {from} to {to}"),
            Self::Merge { inputs, output_level } => {
                write!(f, "merge")?;
                for (level, file) in inputs {
                    write!(f, " {file}@{level}")?;
                }
                write!(f, " into {output_level}")
            }
        }
    }
}

/// The operations which bring a level assignment down to `target_num_levels` levels.
///
/// Every file of the assignment the plan was made from is consumed by exactly one operation.
/// Merges never share inputs and write to disjoint key ranges, so the operations may be run
/// in any order; [`execute`] runs them in the order given.
///
/// [`execute`]: super::execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    pub(super) target_num_levels: u8,
    pub(super) ops:               Vec<MigrationOp>,
}

impl MigrationPlan {
    #[inline]
    #[must_use]
    pub const fn target_num_levels(&self) -> u8 {
        self.target_num_levels
    }

    #[inline]
    #[must_use]
    pub fn ops(&self) -> &[MigrationOp] {
        &self.ops
    }

    /// Whether the plan leaves every file at its current level.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.ops.iter().all(MigrationOp::is_identity)
    }

    #[must_use]
    pub fn num_merges(&self) -> usize {
        self.ops.iter().filter(|op| matches!(op, MigrationOp::Merge { .. })).count()
    }

    /// The number of files moved to another level without being rewritten.
    #[must_use]
    pub fn num_moves(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, MigrationOp::Relabel { .. }) && !op.is_identity())
            .count()
    }
}

impl Display for MigrationPlan {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "plan for {} levels: {} merges, {} moves, {} files kept in place",
            self.target_num_levels,
            self.num_merges(),
            self.num_moves(),
            self.ops.iter().filter(|op| op.is_identity()).count(),
        )
    }
}


#[cfg(test)]
mod tests {
    use super::*;


    #[test]
    fn op_inputs_and_outputs() {
        let keep = MigrationOp::Relabel {
            file: FileNumber(4),
            from: Level::new(1),
            to:   Level::new(1),
        };
        let merge = MigrationOp::Merge {
            inputs:       vec![(Level::new(1), FileNumber(2)), (Level::new(3), FileNumber(7))],
            output_level: Level::new(1),
        };

        assert!(keep.is_identity());
        assert!(!merge.is_identity());
        assert_eq!(keep.inputs().collect::<Vec<_>>(), [(Level::new(1), FileNumber(4))]);
        assert_eq!(merge.inputs().count(), 2);
        assert_eq!(merge.to_string(), "merge #000002@L1 #000007@L3 into L1");

        let plan = MigrationPlan {
            target_num_levels: 2,
            ops:               vec![keep, merge],
        };
        assert!(!plan.is_noop());
        assert_eq!((plan.num_merges(), plan.num_moves()), (1, 0));
    }
}
