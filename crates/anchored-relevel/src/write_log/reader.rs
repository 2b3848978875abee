use std::io::{Error as IoError, Read};

use thiserror::Error;

use crate::config_constants::WRITE_LOG_BLOCK_SIZE;
use crate::format::{unmask_checksum, WriteLogRecordType};
use super::writer::HEADER_SIZE;


/// A reader for the log format written by [`WriteLogWriter`].
///
/// Unlike a write-ahead log, a damaged `MANIFEST-_` file cannot be partially salvaged, so this
/// reader reports the first corrupted record as an error instead of skipping it. A physical
/// record cut short by the end of the file is the one exception: it is what a crash partway
/// through [`WriteLogWriter::add_record`] leaves behind, and it ends the log silently.
///
/// [`WriteLogWriter`]: super::WriteLogWriter
/// [`WriteLogWriter::add_record`]: super::WriteLogWriter::add_record
#[derive(Debug)]
pub(crate) struct WriteLogReader {
    contents:      Vec<u8>,
    /// Offset of the next physical record.
    offset:        usize,
    record_buffer: Vec<u8>,
}

#[expect(unreachable_pub, reason = "control visibility at type definition")]
impl WriteLogReader {
    /// Manifests are small, so the whole log file is read up front.
    pub fn new<File: Read>(mut log_file: File) -> Result<Self, IoError> {
        let mut contents = Vec::new();
        log_file.read_to_end(&mut contents)?;
        Ok(Self {
            contents,
            offset:        0,
            record_buffer: Vec::new(),
        })
    }

    /// Returns the next logical record, or `Ok(None)` once the log is exhausted.
    pub fn read_record(&mut self) -> Result<Option<&[u8]>, LogReadError> {
        let mut fragmented = false;
        self.record_buffer.clear();

        loop {
            let Some((record_type, fragment_start, fragment_end)) = self.next_physical()? else {
                // Either a clean end, or a logical record whose tail was never written.
                return Ok(None);
            };
            let fragment = self.contents.get(fragment_start..fragment_end).unwrap_or_default();

            match record_type {
                WriteLogRecordType::Full => {
                    if fragmented {
                        return Err(LogReadError::FullInFragmentedRecord(fragment_start));
                    }
                    self.record_buffer.extend_from_slice(fragment);
                    return Ok(Some(&self.record_buffer));
                }
                WriteLogRecordType::First => {
                    if fragmented {
                        return Err(LogReadError::ExtraFirstInFragmentedRecord(fragment_start));
                    }
                    fragmented = true;
                    self.record_buffer.extend_from_slice(fragment);
                }
                WriteLogRecordType::Middle => {
                    if !fragmented {
                        return Err(LogReadError::MiddleWithoutFirst(fragment_start));
                    }
                    self.record_buffer.extend_from_slice(fragment);
                }
                WriteLogRecordType::Last => {
                    if !fragmented {
                        return Err(LogReadError::LastWithoutFirst(fragment_start));
                    }
                    self.record_buffer.extend_from_slice(fragment);
                    return Ok(Some(&self.record_buffer));
                }
            }
        }
    }

    /// Returns the type and the byte range of the next physical record's data.
    fn next_physical(
        &mut self,
    ) -> Result<Option<(WriteLogRecordType, usize, usize)>, LogReadError> {
        loop {
            let remaining_in_block = remaining_in_block_at(self.offset);
            if remaining_in_block < HEADER_SIZE {
                // Skip the zeroed trailer of the block.
                self.offset += remaining_in_block;
            }

            let header_start = self.offset;
            let Some(header) = self.contents
                .get(header_start..header_start + HEADER_SIZE)
                .and_then(|header| <[u8; HEADER_SIZE]>::try_from(header).ok())
            else {
                return Ok(None);
            };

            let [c0, c1, c2, c3, l0, l1, raw_type] = header;
            let masked_checksum = u32::from_le_bytes([c0, c1, c2, c3]);
            let length = usize::from(u16::from_le_bytes([l0, l1]));
            let data_start = header_start + HEADER_SIZE;
            let data_end = data_start + length;

            if raw_type == 0 && length == 0 {
                // Zeroed padding, as left by a preallocating filesystem. Skip to the next block.
                self.offset = header_start + remaining_in_block_at(header_start);
                continue;
            }

            if HEADER_SIZE + length > remaining_in_block_at(header_start) {
                return Err(LogReadError::BadRecordLength(header_start));
            }
            if data_end > self.contents.len() {
                // Truncated by a crash while writing.
                return Ok(None);
            }

            let record_type = WriteLogRecordType::try_from(raw_type)
                .map_err(|()| LogReadError::UnknownRecordType(header_start, raw_type))?;

            let data = self.contents.get(data_start..data_end).unwrap_or_default();
            let checksum = crc32c::crc32c_append(crc32c::crc32c(&[raw_type]), data);
            if checksum != unmask_checksum(masked_checksum) {
                return Err(LogReadError::ChecksumMismatch(header_start));
            }

            self.offset = data_end;
            return Ok(Some((record_type, data_start, data_end)));
        }
    }
}

#[inline]
#[must_use]
const fn remaining_in_block_at(offset: usize) -> usize {
    WRITE_LOG_BLOCK_SIZE - offset % WRITE_LOG_BLOCK_SIZE
}

/// Corruption detected in a `MANIFEST-_` file. Each variant carries the file offset of the
/// offending physical record.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogReadError {
    #[error("checksum mismatch in the physical record at offset {0}")]
    ChecksumMismatch(usize),
    #[error("the physical record at offset {0} claims a length extending past its block")]
    BadRecordLength(usize),
    #[error("unknown record type {1} in the physical record at offset {0}")]
    UnknownRecordType(usize, u8),
    #[error("a Full record at offset {0} interrupted a fragmented record")]
    FullInFragmentedRecord(usize),
    #[error("a First record at offset {0} interrupted a fragmented record")]
    ExtraFirstInFragmentedRecord(usize),
    #[error("a Middle record at offset {0} did not follow a First record")]
    MiddleWithoutFirst(usize),
    #[error("a Last record at offset {0} did not follow a First record")]
    LastWithoutFirst(usize),
}


#[cfg(test)]
mod tests {
    use std::{io::Cursor, path::Path};

    use anchored_vfs::{traits::WritableFilesystem as _, MemoryFS};

    use crate::write_log::WriteLogWriter;
    use super::*;


    fn write_records(records: &[&[u8]]) -> Vec<u8> {
        let fs = MemoryFS::new();
        let path = Path::new("/log");
        let mut writer = WriteLogWriter::new_empty(fs.open_writable(path, false).unwrap());
        for record in records {
            writer.add_record(record).unwrap();
        }
        fs.read_file(path).unwrap()
    }

    fn read_all(contents: Vec<u8>) -> Result<Vec<Vec<u8>>, LogReadError> {
        let mut reader = WriteLogReader::new(Cursor::new(contents)).unwrap();
        let mut records = Vec::new();
        while let Some(record) = reader.read_record()? {
            records.push(record.to_vec());
        }
        Ok(records)
    }

    #[test]
    fn records_span_blocks() {
        let large = (0..3 * WRITE_LOG_BLOCK_SIZE).map(|i| (i % 251) as u8).collect::<Vec<_>>();
        let records: [&[u8]; 4] = [b"first", &large, b"", b"last"];

        let read = read_all(write_records(&records)).unwrap();
        assert_eq!(read, records.map(<[u8]>::to_vec));
    }

    #[test]
    fn truncated_tail_ends_the_log() {
        let mut contents = write_records(&[b"kept", b"lost record"]);
        contents.truncate(contents.len() - 2);

        assert_eq!(read_all(contents).unwrap(), [b"kept".to_vec()]);
    }

    #[test]
    fn flipped_bit_is_corruption() {
        let mut contents = write_records(&[b"kept", b"damaged"]);
        let last = contents.len() - 1;
        contents[last] ^= 1;

        assert_eq!(
            read_all(contents),
            Err(LogReadError::ChecksumMismatch(HEADER_SIZE + 4)),
        );
    }
}
