mod assignment;
mod builder;
mod version_edit;


pub use self::{assignment::LevelAssignment, builder::ApplyEditError};
pub(crate) use self::{
    builder::VersionBuilder,
    version_edit::{VersionEdit, VersionEditDecodeError},
};
