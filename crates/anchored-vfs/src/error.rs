use std::io::{Error as IoError, ErrorKind};

use crate::util_traits::FSError;


impl FSError for IoError {
    #[inline]
    fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}
