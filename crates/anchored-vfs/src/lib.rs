// Main filesystem traits
mod fs_traits;
// Traits relied on by filesystem traits
mod util_traits;
// Implementations of the error traits for std types.
mod error;


// ================================
//  Filesystem implementations
// ================================

// Currently, only unix and windows are supported.
#[cfg(all(feature = "std-fs", any(unix, windows)))]
pub mod std_fs;

pub mod memory_fs;


// ================================
//  Re-exports
// ================================

/// Module containing all the traits defined in this crate. May be used as a prelude.
pub mod traits {
    pub use crate::{
        fs_traits::{ReadableFilesystem, WritableFilesystem},
        util_traits::{FSError, FSLockError, WritableFile},
    };
}

// Currently, only unix and windows are supported.
#[cfg(all(feature = "std-fs", any(unix, windows)))]
pub use self::std_fs::StandardFS;

pub use self::memory_fs::{Fault, FaultKind, MemoryFS};
