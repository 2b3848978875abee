use std::{io::Read as _, path::Path};

use anchored_vfs::traits::ReadableFilesystem;

use crate::{
    config_constants::TABLE_MAGIC_NUMBER,
    database_files::DbFileName,
    format::{
        EntryType, FileNumber, SequenceNumber,
        read_length_prefixed, read_varint_u64, unmask_checksum,
    },
};
use super::{FOOTER_LEN, TableError};


/// A single entry of a table file: the newest version of `user_key` known to the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TableEntry {
    pub user_key:   Vec<u8>,
    pub sequence:   SequenceNumber,
    pub entry_type: EntryType,
    /// Empty for deletions.
    pub value:      Vec<u8>,
}

/// A fully-parsed, immutable table file, sorted by user key.
#[derive(Debug)]
pub(crate) struct Table {
    file_number: FileNumber,
    entries:     Vec<TableEntry>,
}

#[expect(unreachable_pub, reason = "control visibility at type definition")]
impl Table {
    /// Read and verify the table file with the given number.
    ///
    /// If `expected_size` is provided, a file of any other size is reported as corrupt.
    pub fn open<FS: ReadableFilesystem>(
        filesystem:    &FS,
        db_directory:  &Path,
        file_number:   FileNumber,
        expected_size: Option<u64>,
    ) -> Result<Self, TableError<FS::Error>> {
        let path = DbFileName::Table { file_number }.file_path(db_directory);
        let mut file = filesystem
            .open_sequential(&path)
            .map_err(|err| TableError::Open(file_number, err))?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents).map_err(|err| TableError::Read(file_number, err))?;

        if let Some(expected_size) = expected_size {
            if u64::try_from(contents.len()).ok() != Some(expected_size) {
                return Err(TableError::Corruption {
                    file_number,
                    reason: "file size does not match the manifest",
                });
            }
        }

        let entries = parse_entries(&contents).map_err(|reason| TableError::Corruption {
            file_number,
            reason,
        })?;

        Ok(Self { file_number, entries })
    }

    #[inline]
    #[must_use]
    pub const fn file_number(&self) -> FileNumber {
        self.file_number
    }

    #[must_use]
    pub fn get(&self, user_key: &[u8]) -> Option<&TableEntry> {
        let index = self.entries
            .binary_search_by(|entry| entry.user_key.as_slice().cmp(user_key))
            .ok()?;
        self.entries.get(index)
    }

    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[TableEntry] {
        &self.entries
    }
}

fn parse_entries(contents: &[u8]) -> Result<Vec<TableEntry>, &'static str> {
    let data_len = contents
        .len()
        .checked_sub(FOOTER_LEN)
        .ok_or("file is shorter than the footer")?;
    let (mut data, footer) = contents.split_at(data_len);

    let footer = <[u8; FOOTER_LEN]>::try_from(footer).map_err(|_| "footer has the wrong length")?;
    let [n0, n1, n2, n3, c0, c1, c2, c3, magic @ ..] = footer;

    if u64::from_le_bytes(magic) != TABLE_MAGIC_NUMBER {
        return Err("bad magic number");
    }
    let expected_checksum = unmask_checksum(u32::from_le_bytes([c0, c1, c2, c3]));
    if crc32c::crc32c(data) != expected_checksum {
        return Err("checksum mismatch");
    }

    let num_entries = u32::from_le_bytes([n0, n1, n2, n3]);
    let mut entries = Vec::with_capacity(usize::try_from(num_entries).unwrap_or(0).min(1 << 16));

    while !data.is_empty() {
        let user_key = read_length_prefixed(&mut data).map_err(|()| "truncated user key")?;
        let sequence = read_varint_u64(&mut data)
            .ok()
            .and_then(SequenceNumber::new_usable)
            .ok_or("bad sequence number")?;
        let (&raw_type, rest) = data.split_first().ok_or("truncated entry type")?;
        data = rest;
        let entry_type = EntryType::try_from(raw_type).map_err(|()| "unknown entry type")?;
        let value = read_length_prefixed(&mut data).map_err(|()| "truncated value")?;

        if entries.last().is_some_and(|prev: &TableEntry| prev.user_key.as_slice() >= user_key) {
            return Err("user keys are not strictly increasing");
        }

        entries.push(TableEntry {
            user_key: user_key.to_vec(),
            sequence,
            entry_type,
            value: value.to_vec(),
        });
    }

    if u32::try_from(entries.len()).ok() != Some(num_entries) {
        return Err("entry count does not match the footer");
    }

    Ok(entries)
}
