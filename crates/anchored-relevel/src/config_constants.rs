/// The number of levels a newly created database has, unless configured otherwise.
pub const DEFAULT_NUM_LEVELS: u8 = 7;

/// The highest level which a flushed memtable may be placed at, unless configured otherwise.
pub const DEFAULT_MAX_MEMTABLE_FLUSH_LEVEL: u8 = 2;

/// The size at which a table file being written by a merge is finished and a new one started,
/// unless configured otherwise.
pub const DEFAULT_TARGET_FILE_SIZE: u64 = 2 << 20;

/// The number of open tables kept in the table cache, unless configured otherwise.
pub const DEFAULT_TABLE_CACHE_CAPACITY: usize = 64;

/// The block size for the log format used by `MANIFEST-_` files.
pub(crate) const WRITE_LOG_BLOCK_SIZE: usize = 1 << 15;

/// The final eight bytes of every table file.
pub(crate) const TABLE_MAGIC_NUMBER: u64 = 0x7265_6c65_7665_6c31;

/// A flushed memtable is not pushed down to a level if the files it overlaps two levels further
/// down total more than this many times the target file size.
pub(crate) const MAX_GRANDPARENT_OVERLAP_FACTOR: u64 = 10;
