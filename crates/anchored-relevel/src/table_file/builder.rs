use std::io::{Error as IoError, ErrorKind};
use std::fmt::{Debug, Formatter, Result as FmtResult};

use anchored_vfs::traits::WritableFile;

use crate::{
    config_constants::TABLE_MAGIC_NUMBER,
    file_tracking::FileMetadata,
    format::{
        EntryType, FileNumber, SequenceNumber,
        mask_checksum, write_length_prefixed, write_varint_u64,
    },
};
use super::FOOTER_LEN;


/// Writes a sorted table file, one entry at a time.
///
/// Every user key may appear at most once, and keys must be added in strictly increasing order.
pub(crate) struct TableBuilder<File> {
    file_number:   FileNumber,
    file:          File,
    entry_buffer:  Vec<u8>,
    num_entries:   u32,
    data_checksum: u32,
    data_len:      u64,
    smallest_key:  Option<Vec<u8>>,
    largest_key:   Vec<u8>,
    smallest_seq:  SequenceNumber,
    largest_seq:   SequenceNumber,
}

#[expect(unreachable_pub, reason = "control visibility at type definition")]
impl<File: WritableFile> TableBuilder<File> {
    #[must_use]
    pub const fn new(file_number: FileNumber, file: File) -> Self {
        Self {
            file_number,
            file,
            entry_buffer:  Vec::new(),
            num_entries:   0,
            data_checksum: 0,
            data_len:      0,
            smallest_key:  None,
            largest_key:   Vec::new(),
            smallest_seq:  SequenceNumber::MAX_USABLE_SEQUENCE_NUMBER,
            largest_seq:   SequenceNumber::ZERO,
        }
    }

    #[inline]
    #[must_use]
    pub const fn file_number(&self) -> FileNumber {
        self.file_number
    }

    #[inline]
    #[must_use]
    pub const fn num_entries(&self) -> u32 {
        self.num_entries
    }

    /// The size the file would have if it were finished now.
    #[inline]
    #[must_use]
    pub const fn estimated_size(&self) -> u64 {
        #[expect(clippy::as_conversions, reason = "the footer length fits in a u64")]
        let footer_len = FOOTER_LEN as u64;
        self.data_len + footer_len
    }

    pub fn add(
        &mut self,
        user_key:   &[u8],
        sequence:   SequenceNumber,
        entry_type: EntryType,
        value:      &[u8],
    ) -> Result<(), IoError> {
        if self.smallest_key.is_some() && user_key <= self.largest_key.as_slice() {
            return Err(IoError::new(
                ErrorKind::InvalidInput,
                format!("keys added to table {} out of order", self.file_number),
            ));
        }

        self.entry_buffer.clear();
        write_length_prefixed(&mut self.entry_buffer, user_key);
        write_varint_u64(&mut self.entry_buffer, sequence.inner());
        self.entry_buffer.push(u8::from(entry_type));
        write_length_prefixed(&mut self.entry_buffer, value);

        self.file.write_all(&self.entry_buffer)?;
        self.data_checksum = crc32c::crc32c_append(self.data_checksum, &self.entry_buffer);
        self.data_len += u64::try_from(self.entry_buffer.len()).unwrap_or(u64::MAX);
        self.num_entries = self.num_entries.checked_add(1).ok_or_else(|| {
            IoError::new(ErrorKind::InvalidInput, "too many entries for one table file")
        })?;

        if self.smallest_key.is_none() {
            self.smallest_key = Some(user_key.to_vec());
        }
        self.largest_key.clear();
        self.largest_key.extend_from_slice(user_key);
        self.smallest_seq = self.smallest_seq.min(sequence);
        self.largest_seq = self.largest_seq.max(sequence);

        Ok(())
    }

    /// Write the footer and sync the file.
    ///
    /// Returns `Ok(None)` if no entries were added; the (entry-less) file is still written, and
    /// the caller should delete it.
    pub fn finish(mut self) -> Result<Option<FileMetadata>, IoError> {
        self.file.write_all(&self.num_entries.to_le_bytes())?;
        self.file.write_all(&mask_checksum(self.data_checksum).to_le_bytes())?;
        self.file.write_all(&TABLE_MAGIC_NUMBER.to_le_bytes())?;
        self.file.sync_data()?;

        let Some(smallest_key) = &self.smallest_key else {
            return Ok(None);
        };

        Ok(Some(FileMetadata::new(
            self.file_number,
            self.estimated_size(),
            smallest_key,
            &self.largest_key,
            self.smallest_seq,
            self.largest_seq,
        )))
    }
}

impl<File> Debug for TableBuilder<File> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("TableBuilder")
            .field("file_number", &self.file_number)
            .field("file",        &"<File>")
            .field("num_entries", &self.num_entries)
            .field("data_len",    &self.data_len)
            .finish_non_exhaustive()
    }
}
