mod builder;
mod table;


pub(crate) use self::{
    builder::TableBuilder,
    table::{Table, TableEntry},
};

use std::io::Error as IoError;

use thiserror::Error;

use crate::format::FileNumber;


/// The length of the footer at the end of every table file: a `u32` entry count, a `u32`
/// masked checksum of the entries, and a `u64` magic number.
const FOOTER_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum TableError<FsError> {
    #[error("could not create table file {0}: {1}")]
    Create(FileNumber, FsError),
    #[error("could not write table file {0}: {1}")]
    Write(FileNumber, IoError),
    #[error("could not open table file {0}: {1}")]
    Open(FileNumber, FsError),
    #[error("could not read table file {0}: {1}")]
    Read(FileNumber, IoError),
    #[error("table file {file_number} is corrupt: {reason}")]
    Corruption {
        file_number: FileNumber,
        reason:      &'static str,
    },
}
