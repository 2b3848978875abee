mod file_metadata;
mod file_numbers;
mod level;


pub use self::{
    file_metadata::FileMetadata,
    file_numbers::FileNumberAllocator,
    level::Level,
};
