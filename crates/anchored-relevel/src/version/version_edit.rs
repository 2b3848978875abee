use std::collections::BTreeSet;
use std::sync::Arc;

use crate::file_tracking::{FileMetadata, Level};
use crate::format::{
    FileNumber, SequenceNumber, VersionEditTag,
    read_length_prefixed, read_varint_u32, read_varint_u64,
    write_length_prefixed, write_varint_u32, write_varint_u64,
};


/// One record of a `MANIFEST-_` file. The first record of every manifest is a full snapshot,
/// describing every live file; later records describe changes relative to the state before them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct VersionEdit {
    pub num_levels:       Option<u8>,
    pub next_file_number: Option<FileNumber>,
    pub last_sequence:    Option<SequenceNumber>,
    pub deleted_files:    BTreeSet<(Level, FileNumber)>,
    pub new_files:        Vec<(Level, Arc<FileMetadata>)>,
}

#[expect(unreachable_pub, reason = "control visibility at type definition")]
impl VersionEdit {
    #[inline]
    #[must_use]
    pub fn new_empty() -> Self {
        Self::default()
    }

    pub fn decode_from(mut input: &[u8]) -> Result<Self, VersionEditDecodeError> {
        let mut edit = Self::new_empty();

        while !input.is_empty() {
            let tag = read_tag(&mut input)?;
            let malformed = VersionEditDecodeError::MalformedField(tag);

            match tag {
                VersionEditTag::NumLevels => {
                    let num_levels = read_varint_u32(&mut input).map_err(|()| malformed)?;
                    edit.num_levels = Some(u8::try_from(num_levels).map_err(|_| malformed)?);
                }
                VersionEditTag::NextFileNumber => {
                    edit.next_file_number = Some(
                        read_file_number(&mut input).map_err(|()| malformed)?,
                    );
                }
                VersionEditTag::LastSequence => {
                    edit.last_sequence = Some(
                        read_sequence_number(&mut input).map_err(|()| malformed)?,
                    );
                }
                VersionEditTag::DeletedFile => {
                    let level = read_level(&mut input).map_err(|()| malformed)?;
                    let file_number = read_file_number(&mut input).map_err(|()| malformed)?;
                    edit.deleted_files.insert((level, file_number));
                }
                VersionEditTag::NewFile => {
                    let (level, metadata) = read_new_file(&mut input).map_err(|()| malformed)?;
                    edit.new_files.push((level, Arc::new(metadata)));
                }
            }
        }

        Ok(edit)
    }

    pub fn encode(&self, output: &mut Vec<u8>) {
        if let Some(num_levels) = self.num_levels {
            write_tag(output, VersionEditTag::NumLevels);
            write_varint_u32(output, u32::from(num_levels));
        }
        if let Some(next_file_number) = self.next_file_number {
            write_tag(output, VersionEditTag::NextFileNumber);
            write_varint_u64(output, next_file_number.0);
        }
        if let Some(last_sequence) = self.last_sequence {
            write_tag(output, VersionEditTag::LastSequence);
            write_varint_u64(output, last_sequence.inner());
        }
        for &(level, file_number) in &self.deleted_files {
            write_tag(output, VersionEditTag::DeletedFile);
            write_varint_u32(output, u32::from(level.inner()));
            write_varint_u64(output, file_number.0);
        }
        for (level, metadata) in &self.new_files {
            write_tag(output, VersionEditTag::NewFile);
            write_varint_u32(output, u32::from(level.inner()));
            write_varint_u64(output, metadata.file_number().0);
            write_varint_u64(output, metadata.file_size());
            write_length_prefixed(output, metadata.smallest_user_key());
            write_varint_u64(output, metadata.smallest_seq().inner());
            write_length_prefixed(output, metadata.largest_user_key());
            write_varint_u64(output, metadata.largest_seq().inner());
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VersionEditDecodeError {
    #[error("unknown or truncated version edit tag")]
    UnknownTag,
    #[error("malformed field after version edit tag {0:?}")]
    MalformedField(VersionEditTag),
}

fn read_tag(input: &mut &[u8]) -> Result<VersionEditTag, VersionEditDecodeError> {
    let tag = read_varint_u32(input).map_err(|()| VersionEditDecodeError::UnknownTag)?;
    VersionEditTag::try_from(tag).map_err(|()| VersionEditDecodeError::UnknownTag)
}

fn read_level(input: &mut &[u8]) -> Result<Level, ()> {
    let level = read_varint_u32(input)?;
    u8::try_from(level).map(Level::new).map_err(|_| ())
}

fn read_file_number(input: &mut &[u8]) -> Result<FileNumber, ()> {
    read_varint_u64(input).map(FileNumber)
}

fn read_sequence_number(input: &mut &[u8]) -> Result<SequenceNumber, ()> {
    SequenceNumber::new_usable(read_varint_u64(input)?).ok_or(())
}

fn read_new_file(input: &mut &[u8]) -> Result<(Level, FileMetadata), ()> {
    let level = read_level(input)?;
    let file_number = read_file_number(input)?;
    let file_size = read_varint_u64(input)?;
    let smallest_user_key = read_length_prefixed(input)?;
    let smallest_seq = read_sequence_number(input)?;
    let largest_user_key = read_length_prefixed(input)?;
    let largest_seq = read_sequence_number(input)?;

    let metadata = FileMetadata::new(
        file_number,
        file_size,
        smallest_user_key,
        largest_user_key,
        smallest_seq,
        largest_seq,
    );
    Ok((level, metadata))
}

fn write_tag(output: &mut Vec<u8>, tag: VersionEditTag) {
    write_varint_u32(output, u32::from(tag));
}
