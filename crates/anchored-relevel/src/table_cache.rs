use std::{path::Path, sync::Arc};
use std::fmt::{Debug, Formatter, Result as FmtResult};

use quick_cache::sync::Cache;

use anchored_vfs::traits::ReadableFilesystem;

use crate::{file_tracking::FileMetadata, format::FileNumber, table_file::{Table, TableError}};


/// Keeps recently used tables parsed in memory, keyed by file number.
///
/// Table files are immutable, so a cached table never needs to be invalidated; it only needs to
/// be evicted once its file is deleted.
pub(crate) struct TableCache(Cache<FileNumber, Arc<Table>>);

#[expect(unreachable_pub, reason = "control visibility at type definition")]
impl TableCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self(Cache::new(capacity.max(1)))
    }

    /// Get the table described by `file`, reading it from `filesystem` on a cache miss.
    pub fn get_or_open<FS: ReadableFilesystem>(
        &self,
        filesystem:   &FS,
        db_directory: &Path,
        file:         &FileMetadata,
    ) -> Result<Arc<Table>, TableError<FS::Error>> {
        let file_number = file.file_number();
        if let Some(table) = self.0.get(&file_number) {
            return Ok(table);
        }

        let table = Arc::new(Table::open(
            filesystem,
            db_directory,
            file_number,
            Some(file.file_size()),
        )?);
        self.0.insert(file_number, Arc::clone(&table));
        Ok(table)
    }

    pub fn evict(&self, file_number: FileNumber) {
        let _evicted = self.0.remove(&file_number);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl Debug for TableCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("TableCache")
            .field("len",      &self.0.len())
            .field("capacity", &self.0.capacity())
            .finish()
    }
}
