use std::fmt::{Display, Formatter, Result as FmtResult};


/// A level of the LSM tree. Level 0 holds freshly flushed tables, which may overlap; every
/// greater level holds tables with pairwise disjoint key ranges.
///
/// Unlike the number of levels, which is a property of a particular database, a `Level` is just
/// an index; it is checked against the configured level count wherever one is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Level(u8);

impl Level {
    pub const ZERO: Self = Self(0);

    #[inline]
    #[must_use]
    pub const fn new(level: u8) -> Self {
        Self(level)
    }

    #[inline]
    #[must_use]
    pub const fn inner(self) -> u8 {
        self.0
    }

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    #[inline]
    #[must_use]
    pub const fn next_level(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(next) => Some(Self(next)),
            None       => None,
        }
    }

    /// Get the levels `0..num_levels` in increasing order.
    #[inline]
    pub fn all_levels(num_levels: u8) -> impl ExactSizeIterator<Item = Self> + DoubleEndedIterator {
        (0..num_levels).map(Self)
    }

    /// Get all the levels from `self` to `other`, inclusive.
    ///
    /// If `self > other`, the returned iterator is empty.
    #[inline]
    pub fn inclusive_range(self, other: Self) -> impl DoubleEndedIterator<Item = Self> {
        (self.0..=other.0).map(Self)
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "L{}", self.0)
    }
}
