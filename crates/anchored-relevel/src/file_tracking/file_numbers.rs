use crate::format::FileNumber;


/// Hands out file numbers for new table and manifest files.
///
/// Numbers are never reused, even if the file they were handed out for is never committed;
/// the counter is persisted in every manifest snapshot as the next file number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileNumberAllocator {
    next_file_number: FileNumber,
}

impl FileNumberAllocator {
    #[inline]
    #[must_use]
    pub const fn new(next_file_number: FileNumber) -> Self {
        Self { next_file_number }
    }

    #[inline]
    #[must_use]
    pub const fn next_file_number(&self) -> FileNumber {
        self.next_file_number
    }

    #[inline]
    pub fn allocate(&mut self) -> FileNumber {
        let file_number = self.next_file_number;
        self.next_file_number = file_number.next();
        file_number
    }

    /// Make sure that `used` will never be handed out.
    #[inline]
    pub fn mark_used(&mut self, used: FileNumber) {
        if used >= self.next_file_number {
            self.next_file_number = used.next();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;


    #[test]
    fn allocation_skips_used_numbers() {
        let mut allocator = FileNumberAllocator::new(FileNumber(2));
        assert_eq!(allocator.allocate(), FileNumber(2));

        allocator.mark_used(FileNumber(9));
        allocator.mark_used(FileNumber(4));
        assert_eq!(allocator.allocate(), FileNumber(10));
        assert_eq!(allocator.next_file_number(), FileNumber(11));
    }
}
