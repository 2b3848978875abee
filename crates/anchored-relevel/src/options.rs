use crate::{
    config_constants::{
        DEFAULT_MAX_MEMTABLE_FLUSH_LEVEL, DEFAULT_NUM_LEVELS, DEFAULT_TABLE_CACHE_CAPACITY,
        DEFAULT_TARGET_FILE_SIZE,
    },
    info_logger::InfoLogLevelFilter,
};


/// Options for [`Database::open`].
///
/// [`Database::open`]: crate::Database::open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// Create an empty database if the directory does not contain one.
    pub create_if_missing:        bool,
    /// The number of levels of the database. Opening fails if a file sits at a level at or
    /// beyond this count; use [`reduce_levels`] to move such files first.
    ///
    /// [`reduce_levels`]: crate::reduce_levels
    pub num_levels:               u8,
    /// The greatest level a flushed memtable may be written to, if no file at any shallower
    /// level overlaps it. Capped at `num_levels - 1`.
    pub max_memtable_flush_level: u8,
    /// Merged outputs are split into files of roughly this size.
    pub target_file_size:         u64,
    /// The number of parsed table files kept in memory.
    pub table_cache_capacity:     usize,
    pub info_log_filter:          InfoLogLevelFilter,
}

impl OpenOptions {
    /// Options which open an existing database, or create a new one, with the given number of
    /// levels. Other options take their default values.
    #[inline]
    #[must_use]
    pub fn with_num_levels(num_levels: u8) -> Self {
        Self {
            num_levels,
            ..Self::default()
        }
    }
}

impl Default for OpenOptions {
    #[inline]
    fn default() -> Self {
        Self {
            create_if_missing:        true,
            num_levels:               DEFAULT_NUM_LEVELS,
            max_memtable_flush_level: DEFAULT_MAX_MEMTABLE_FLUSH_LEVEL,
            target_file_size:         DEFAULT_TARGET_FILE_SIZE,
            table_cache_capacity:     DEFAULT_TABLE_CACHE_CAPACITY,
            info_log_filter:          InfoLogLevelFilter::Off,
        }
    }
}

/// Options for [`reduce_levels`].
///
/// [`reduce_levels`]: crate::reduce_levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReduceLevelsOptions {
    /// The number of levels the database should have afterwards. Must be at least 1.
    pub target_num_levels: u8,
    /// Log the number of files at each level before migrating, not only afterwards.
    pub print_old_levels:  bool,
    /// Merged outputs are split into files of roughly this size.
    pub target_file_size:  u64,
    /// Whether to also write migration messages to the database's `LOG` file.
    pub info_log_filter:   InfoLogLevelFilter,
}

impl ReduceLevelsOptions {
    #[inline]
    #[must_use]
    pub const fn new(target_num_levels: u8) -> Self {
        Self {
            target_num_levels,
            print_old_levels: false,
            target_file_size: DEFAULT_TARGET_FILE_SIZE,
            info_log_filter:  InfoLogLevelFilter::Off,
        }
    }
}
