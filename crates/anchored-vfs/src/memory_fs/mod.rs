mod fault;
mod file;
mod fs;
mod lockfile;


pub use self::{
    fault::{Fault, FaultKind},
    file::MemoryFile,
    fs::{MemoryFS, DirectoryChildren},
    lockfile::{LockError, Lockfile},
};
