use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::format::{FileNumber, SequenceNumber};


/// Metadata for a table file.
///
/// The level of a file is not part of its metadata; it is determined by the
/// [`LevelAssignment`] holding it, so moving a file between levels never touches this struct.
///
/// [`LevelAssignment`]: crate::LevelAssignment
#[derive(Clone, PartialEq, Eq)]
pub struct FileMetadata {
    file_number:           FileNumber,
    file_size:             u64,
    /// Consists of the smallest user key concatenated with the largest user key.
    ///
    /// As an invariant, its length is always at least `self.smallest_user_key_len`.
    user_key_buffer:       Vec<u8>,
    smallest_user_key_len: usize,
    smallest_seq:          SequenceNumber,
    largest_seq:           SequenceNumber,
}

impl FileMetadata {
    #[must_use]
    pub fn new(
        file_number:       FileNumber,
        file_size:         u64,
        smallest_user_key: &[u8],
        largest_user_key:  &[u8],
        smallest_seq:      SequenceNumber,
        largest_seq:       SequenceNumber,
    ) -> Self {
        let smallest_user_key_len = smallest_user_key.len();

        let mut user_key_buffer = Vec::with_capacity(
            smallest_user_key_len + largest_user_key.len(),
        );
        // Invariant satisfied here: length is at least `smallest_user_key_len`.
        user_key_buffer.extend(smallest_user_key);
        user_key_buffer.extend(largest_user_key);

        Self {
            file_number,
            file_size,
            user_key_buffer,
            smallest_user_key_len,
            smallest_seq,
            largest_seq,
        }
    }

    #[must_use]
    pub const fn file_number(&self) -> FileNumber {
        self.file_number
    }

    #[must_use]
    pub const fn file_size(&self) -> u64 {
        self.file_size
    }

    #[must_use]
    pub fn smallest_user_key(&self) -> &[u8] {
        #[expect(
            clippy::indexing_slicing,
            reason = "invariant: len of `user_key_buffer` is at least `self.smallest_user_key_len`",
        )]
        &self.user_key_buffer[..self.smallest_user_key_len]
    }

    #[must_use]
    pub fn largest_user_key(&self) -> &[u8] {
        #[expect(
            clippy::indexing_slicing,
            reason = "invariant: len of `user_key_buffer` is at least `self.smallest_user_key_len`",
        )]
        &self.user_key_buffer[self.smallest_user_key_len..]
    }

    #[must_use]
    pub const fn smallest_seq(&self) -> SequenceNumber {
        self.smallest_seq
    }

    #[must_use]
    pub const fn largest_seq(&self) -> SequenceNumber {
        self.largest_seq
    }

    /// Whether the smallest key and sequence number are no greater than the largest ones.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.smallest_user_key() <= self.largest_user_key() && self.smallest_seq <= self.largest_seq
    }

    /// Whether the user key range of this file intersects `[smallest, largest]`.
    #[must_use]
    pub fn overlaps_range(&self, smallest: &[u8], largest: &[u8]) -> bool {
        self.smallest_user_key() <= largest && smallest <= self.largest_user_key()
    }

    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.overlaps_range(other.smallest_user_key(), other.largest_user_key())
    }
}

impl Debug for FileMetadata {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FileMetadata")
            .field("file_number",       &self.file_number)
            .field("file_size",         &self.file_size)
            .field("smallest_user_key", &String::from_utf8_lossy(self.smallest_user_key()))
            .field("largest_user_key",  &String::from_utf8_lossy(self.largest_user_key()))
            .field("smallest_seq",      &self.smallest_seq)
            .field("largest_seq",       &self.largest_seq)
            .finish()
    }
}
