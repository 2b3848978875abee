use std::io::Error as IoError;
use std::fmt::{Debug, Formatter, Result as FmtResult};

use thiserror::Error;

use anchored_vfs::traits::WritableFile;

use crate::config_constants::WRITE_LOG_BLOCK_SIZE;
use crate::format::{mask_checksum, WriteLogRecordType};


/// The header of each physical record is 7 bytes long.
pub(super) const HEADER_SIZE: usize = size_of::<u32>() + size_of::<u16>() + size_of::<u8>();


/// A writer for the log format used by LevelDB to store serialized [`VersionEdit`]s in
/// `MANIFEST-_` files.
///
/// [`VersionEdit`]: crate::version::VersionEdit
pub(crate) struct WriteLogWriter<File> {
    log_file:        File,
    type_checksums:  [u32; WriteLogRecordType::ALL_TYPES.len()],
    /// The space remaining in the current block of [`WRITE_LOG_BLOCK_SIZE`] bytes.
    ///
    /// This should be in the range `0..=WRITE_LOG_BLOCK_SIZE`, where `0` should be incremented
    /// to `WRITE_LOG_BLOCK_SIZE`.
    remaining_space: usize,
}

#[expect(unreachable_pub, reason = "control visibility at type definition")]
impl<File: WritableFile> WriteLogWriter<File> {
    #[must_use]
    pub fn new_empty(log_file: File) -> Self {
        Self::new_with_offset(log_file, 0)
    }

    #[must_use]
    pub fn new_with_offset(log_file: File, offset: u64) -> Self {
        #[expect(clippy::unwrap_used, reason = "WRITE_LOG_BLOCK_SIZE == 1 << 15 < u64::MAX")]
        let offset_into_block = offset % u64::try_from(WRITE_LOG_BLOCK_SIZE).unwrap();
        // Note that `0 <= offset_into_block < (WRITE_LOG_BLOCK_SIZE as u64)`
        #[expect(clippy::unwrap_used, reason = "WRITE_LOG_BLOCK_SIZE == 1 << 15 < usize::MAX")]
        let offset_into_block = usize::try_from(offset_into_block).unwrap();
        let remaining_space = WRITE_LOG_BLOCK_SIZE - offset_into_block;

        let type_checksums = WriteLogRecordType::ALL_TYPES.map(|record_type| {
            crc32c::crc32c(&[u8::from(record_type)])
        });
        Self {
            log_file,
            type_checksums,
            remaining_space,
        }
    }

    /// Calls [`WritableFile::sync_data`] on the log file.
    ///
    /// The `WriteLogWriter` syncs its log file only when this function is called.
    pub fn sync_log_data(&mut self) -> Result<(), IoError> {
        self.log_file.sync_data()
    }

    /// A failure to add a record should be treated as fatal for the log file being written.
    /// See the type-level documentation of [`LogWriteError`] for more.
    pub fn add_record(&mut self, record: &[u8]) -> Result<(), LogWriteError> {
        // Make sure the buffer is flushed, so that `inner_add_record` can return early.
        let result = self.inner_add_record(record);
        let flush_result = self.log_file.flush();
        result.or(flush_result).map_err(LogWriteError)
    }

    fn inner_add_record(&mut self, mut record: &[u8]) -> Result<(), IoError> {
        // Indicates whether we're about to emit the first physical record for the given
        // logical `record`.
        let mut first_physical = true;
        let max_trailer = [0_u8; HEADER_SIZE - 1];

        // Empty records are written as a zero-length Full physical record.
        while !record.is_empty() || first_physical {
            if let Some(trailer) = max_trailer.get(..self.remaining_space) {
                // `self.remaining_space < HEADER_SIZE`, so pad the rest of the block with
                // zeroes and move to the next block.
                self.log_file.write_all(trailer)?;
                self.remaining_space = WRITE_LOG_BLOCK_SIZE;
            }

            // We know here that `self.remaining_space >= HEADER_SIZE`.
            let logical_fragment_len = record.len().min(self.remaining_space - HEADER_SIZE);
            let last_physical = logical_fragment_len == record.len();

            let record_type = match (first_physical, last_physical) {
                (true,  true)  => WriteLogRecordType::Full,
                (true,  false) => WriteLogRecordType::First,
                (false, false) => WriteLogRecordType::Middle,
                (false, true)  => WriteLogRecordType::Last,
            };

            let (logical_fragment, remaining) = record.split_at(logical_fragment_len);

            let checksum = crc32c::crc32c_append(self.crc_for_type(record_type), logical_fragment);
            let masked_checksum = mask_checksum(checksum);
            #[expect(
                clippy::unwrap_used,
                reason = "`WRITE_LOG_BLOCK_SIZE < u16::MAX`, so fragment len fits in two bytes",
            )]
            let fragment_len_u16 = u16::try_from(logical_fragment_len).unwrap();

            self.log_file.write_all(&masked_checksum.to_le_bytes())?;
            self.log_file.write_all(&fragment_len_u16.to_le_bytes())?;
            self.log_file.write_all(&[u8::from(record_type)])?;
            self.log_file.write_all(logical_fragment)?;

            record = remaining;
            first_physical = false;
            // `logical_fragment_len + HEADER_SIZE <= self.remaining_space`; no underflow.
            self.remaining_space -= HEADER_SIZE + logical_fragment_len;
        }

        Ok(())
    }

    #[inline]
    #[must_use]
    fn crc_for_type(&self, record_type: WriteLogRecordType) -> u32 {
        #[expect(clippy::indexing_slicing, reason = "one checksum per record type")]
        self.type_checksums[record_type.index()]
    }
}

impl<File> Debug for WriteLogWriter<File> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("WriteLogWriter")
            .field("log_file",        &"<File>")
            .field("type_checksums",  &self.type_checksums)
            .field("remaining_space", &self.remaining_space)
            .finish()
    }
}

/// A `MANIFEST-_` file could not be written to, due to some non-interrupt IO error.
///
/// Partial record data may already have been written, and cannot be taken back through the
/// [`WritableFile`] trait. No further records may be appended to that log file; the manifest
/// it belongs to must either be abandoned (if it was never made current) or the database must be
/// reopened, which stops reading at the damaged record.
#[derive(Error, Debug)]
#[repr(transparent)]
#[error("fatal error in `WriteLogWriter::add_record`: {0}")]
pub(crate) struct LogWriteError(pub IoError);
