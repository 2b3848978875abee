use std::fmt::{Display, Formatter, Result as FmtResult};

use integer_encoding::VarInt;


// ================================================================
//  Numbers
// ================================================================

/// The number identifying a table file, manifest file, or temporary file in a database
/// directory. File numbers are allocated from a single counter and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct FileNumber(pub u64);

impl FileNumber {
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for FileNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "#{:06}", self.0)
    }
}

/// Sequence numbers order every write made to the database. When two entries share a user key,
/// the one with the greater sequence number is newer.
///
/// Only the low 56 bits are usable, matching LevelDB.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub const ZERO: Self = Self(0);
    pub const MAX_USABLE_SEQUENCE_NUMBER: Self = Self((1 << 56) - 1);

    #[inline]
    #[must_use]
    pub const fn new_usable(sequence_number: u64) -> Option<Self> {
        if sequence_number <= Self::MAX_USABLE_SEQUENCE_NUMBER.0 {
            Some(Self(sequence_number))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn inner(self) -> u64 {
        self.0
    }

    /// Returns `None` if the sequence number would exceed
    /// [`SequenceNumber::MAX_USABLE_SEQUENCE_NUMBER`].
    #[inline]
    #[must_use]
    pub const fn checked_next(self) -> Option<Self> {
        Self::new_usable(self.0 + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntryType {
    Deletion = 0,
    Value    = 1,
}

impl From<EntryType> for u8 {
    #[inline]
    fn from(entry_type: EntryType) -> Self {
        entry_type as Self
    }
}

impl TryFrom<u8> for EntryType {
    type Error = ();

    #[inline]
    fn try_from(entry_type: u8) -> Result<Self, Self::Error> {
        match entry_type {
            0 => Ok(Self::Deletion),
            1 => Ok(Self::Value),
            _ => Err(()),
        }
    }
}

// ================================================================
//  Write log format
// ================================================================

/// The type of a physical record in a `MANIFEST-_` file.
///
/// A logical record either fits in one `Full` physical record, or is split into a `First`
/// record, any number of `Middle` records, and a `Last` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum WriteLogRecordType {
    Full   = 1,
    First  = 2,
    Middle = 3,
    Last   = 4,
}

impl WriteLogRecordType {
    pub(crate) const ALL_TYPES: [Self; 4] = [Self::Full, Self::First, Self::Middle, Self::Last];

    #[inline]
    #[must_use]
    pub(crate) const fn index(self) -> usize {
        self as usize - 1
    }
}

impl From<WriteLogRecordType> for u8 {
    #[inline]
    fn from(record_type: WriteLogRecordType) -> Self {
        record_type as Self
    }
}

impl TryFrom<u8> for WriteLogRecordType {
    type Error = ();

    #[inline]
    fn try_from(record_type: u8) -> Result<Self, Self::Error> {
        match record_type {
            1 => Ok(Self::Full),
            2 => Ok(Self::First),
            3 => Ok(Self::Middle),
            4 => Ok(Self::Last),
            _ => Err(()),
        }
    }
}

const CHECKSUM_MASK_DELTA: u32 = 0xa282_ead8;

/// Checksums of data which itself contains checksums are masked, so that computing the CRC of
/// a string containing embedded CRCs does not degrade the checksum's quality.
#[inline]
#[must_use]
pub(crate) const fn mask_checksum(checksum: u32) -> u32 {
    checksum.rotate_right(15).wrapping_add(CHECKSUM_MASK_DELTA)
}

#[inline]
#[must_use]
pub(crate) const fn unmask_checksum(masked: u32) -> u32 {
    masked.wrapping_sub(CHECKSUM_MASK_DELTA).rotate_left(15)
}

// ================================================================
//  Version edit format
// ================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VersionEditTag {
    NumLevels      = 1,
    NextFileNumber = 2,
    LastSequence   = 3,
    DeletedFile    = 4,
    NewFile        = 5,
}

impl From<VersionEditTag> for u32 {
    #[inline]
    fn from(tag: VersionEditTag) -> Self {
        tag as Self
    }
}

impl TryFrom<u32> for VersionEditTag {
    type Error = ();

    #[inline]
    fn try_from(tag: u32) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(Self::NumLevels),
            2 => Ok(Self::NextFileNumber),
            3 => Ok(Self::LastSequence),
            4 => Ok(Self::DeletedFile),
            5 => Ok(Self::NewFile),
            _ => Err(()),
        }
    }
}

// ================================================================
//  Varints and length-prefixed slices
// ================================================================

/// The maximum encoded length of a varint64.
const MAX_VARINT_LEN: usize = 10;

pub(crate) fn read_varint_u64(input: &mut &[u8]) -> Result<u64, ()> {
    let (num, num_len) = u64::decode_var(input).ok_or(())?;
    // `integer_encoding` does not check that the claimed length is in bounds.
    *input = input.get(num_len..).ok_or(())?;
    Ok(num)
}

pub(crate) fn read_varint_u32(input: &mut &[u8]) -> Result<u32, ()> {
    let (num, num_len) = u32::decode_var(input).ok_or(())?;
    *input = input.get(num_len..).ok_or(())?;
    Ok(num)
}

pub(crate) fn write_varint_u64(output: &mut Vec<u8>, value: u64) {
    let mut buf = [0_u8; MAX_VARINT_LEN];
    let len = value.encode_var(&mut buf);
    output.extend(buf.iter().take(len));
}

pub(crate) fn write_varint_u32(output: &mut Vec<u8>, value: u32) {
    write_varint_u64(output, u64::from(value));
}

/// Reads a varint32 length followed by that many bytes.
pub(crate) fn read_length_prefixed<'a>(input: &mut &'a [u8]) -> Result<&'a [u8], ()> {
    let len = usize::try_from(read_varint_u32(input)?).map_err(|_| ())?;
    if len > input.len() {
        return Err(());
    }
    let (slice, rest) = input.split_at(len);
    *input = rest;
    Ok(slice)
}

/// # Panics
/// Panics if `bytes.len()` exceeds [`u32::MAX`]. [`Database`] rejects longer keys and values
/// before they reach a memtable.
///
/// [`Database`]: crate::Database
pub(crate) fn write_length_prefixed(output: &mut Vec<u8>, bytes: &[u8]) {
    #[expect(clippy::expect_used, reason = "longer keys and values are rejected by `Database::write`")]
    let len = u32::try_from(bytes.len()).expect("a key or value exceeded 4 gigabytes");
    write_varint_u32(output, len);
    output.extend_from_slice(bytes);
}


#[cfg(test)]
mod tests {
    use super::*;


    #[test]
    fn mask_roundtrip() {
        for checksum in [0, 1, 0xdead_beef, u32::MAX, crc32c::crc32c(b"foo")] {
            assert_eq!(unmask_checksum(mask_checksum(checksum)), checksum);
        }
    }

    #[test]
    fn truncated_length_prefix_is_rejected() {
        let mut output = Vec::new();
        write_length_prefixed(&mut output, b"hello");
        output.pop();

        assert!(read_length_prefixed(&mut output.as_slice()).is_err());
    }

    #[test]
    fn varints_advance_input() {
        let mut output = Vec::new();
        write_varint_u64(&mut output, 300);
        write_varint_u32(&mut output, 7);

        let mut input = output.as_slice();
        assert_eq!(read_varint_u64(&mut input), Ok(300));
        assert_eq!(read_varint_u32(&mut input), Ok(7));
        assert!(input.is_empty());
        assert!(read_varint_u32(&mut input).is_err());
    }

    #[test]
    fn sequence_numbers_are_bounded() {
        assert!(SequenceNumber::MAX_USABLE_SEQUENCE_NUMBER.checked_next().is_none());
        assert_eq!(SequenceNumber::new_usable(5).map(SequenceNumber::inner), Some(5));
    }
}
