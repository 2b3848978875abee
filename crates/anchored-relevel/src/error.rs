use crate::{manifest::RecoverError, table_file::TableError};


/// A coarse classification of the errors returned by [`Database`] and [`reduce_levels`],
/// for callers which only need to decide how to react.
///
/// [`Database`]: crate::Database
/// [`reduce_levels`]: crate::reduce_levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    /// A bad option, such as a target level count of zero, or a database which does not exist.
    /// Nothing was changed.
    InvalidArgument,
    /// No valid migration plan could be produced. Nothing was changed.
    InfeasibleTarget,
    /// Writing merged table files failed. Any partial output was discarded, and the database is
    /// unchanged.
    MergeFailure,
    /// The new level assignment could not be made durable. The previous one is still in effect.
    CommitFailure,
    /// The database is in use by something else.
    Locked,
    /// Persistent data is damaged, or breaks a level invariant.
    Corruption,
    /// Some other filesystem error.
    Io,
}

impl<FsError> RecoverError<FsError> {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_)                    => ErrorKind::InvalidArgument,
            Self::Corruption { .. }              => ErrorKind::Corruption,
            Self::Filesystem(_) | Self::Io(_)    => ErrorKind::Io,
        }
    }
}

impl<FsError> TableError<FsError> {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Corruption { .. } => ErrorKind::Corruption,
            _                       => ErrorKind::Io,
        }
    }
}
