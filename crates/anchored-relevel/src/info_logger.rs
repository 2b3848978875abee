use std::path::Path;

use tracing::{Level, event, level_filters::LevelFilter};

use anchored_vfs::traits::{WritableFile, WritableFilesystem};

use crate::database_files::DbFileName;


/// A level of verbosity for logging a message to a `LOG` info log file.
///
/// This crate logs messages using [`tracing`]. Additionally, to match the behavior of LevelDB,
/// an option is available to log messages to a `LOG` file in the database directory,
/// and move the previous `LOG` file (if one exists) to `LOG.old`.
///
/// When a database is opened or migrated, the previous `LOG` is untouched if
/// [`InfoLogLevelFilter::Off`] is used; otherwise, a new `LOG` file is opened (and the previous
/// `LOG` is moved to `LOG.old`), and this filter is used to decide which messages to persist to
/// the file and which to log with [`tracing`] alone.
///
/// A greater `InfoLogLevelFilter`, with respect to [`Ord`], indicates a greater verbosity level.
#[repr(u8)]
#[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub enum InfoLogLevelFilter {
    /// Do not write to a `LOG` file.
    #[default]
    Off   = 0,
    /// Log only messages which describe very serious errors.
    Error = 1,
    /// Log messages which describe hazardous situations or very serious errors.
    Warn  = 2,
    /// Log messages which describe useful information, hazardous situations,
    /// or very serious errors.
    Info  = 3,
}

impl From<InfoLogLevelFilter> for LevelFilter {
    fn from(level_filter: InfoLogLevelFilter) -> Self {
        match level_filter {
            InfoLogLevelFilter::Off   => Self::OFF,
            InfoLogLevelFilter::Error => Self::ERROR,
            InfoLogLevelFilter::Warn  => Self::WARN,
            InfoLogLevelFilter::Info  => Self::INFO,
        }
    }
}

/// Writes messages to the `LOG` file of a database, in addition to [`tracing`].
pub(crate) struct InfoLogger<File: WritableFile> {
    /// `None` if the filter is [`InfoLogLevelFilter::Off`] or the `LOG` file could not be opened.
    file:   Option<File>,
    filter: LevelFilter,
}

#[expect(unreachable_pub, reason = "control visibility at type definition")]
impl<File: WritableFile> InfoLogger<File> {
    /// Move any existing `LOG` to `LOG.old` and start a new `LOG`, unless `filter` is `Off`.
    ///
    /// Failing to set up the `LOG` file is not an error; messages then go to [`tracing`] alone.
    pub fn open<FS>(filesystem: &FS, db_directory: &Path, filter: InfoLogLevelFilter) -> Self
    where
        FS: WritableFilesystem<WriteFile = File>,
    {
        if filter == InfoLogLevelFilter::Off {
            return Self::disabled();
        }

        let log_path = DbFileName::InfoLog.file_path(db_directory);
        let old_log_path = DbFileName::OldInfoLog.file_path(db_directory);

        if filesystem.exists(&log_path).unwrap_or(false) {
            if let Err(err) = filesystem.rename(&log_path, &old_log_path) {
                event!(Level::DEBUG, "could not move `LOG` to `LOG.old`: {err}");
            }
        }

        match filesystem.open_writable(&log_path, false) {
            Ok(file) => Self {
                file:   Some(file),
                filter: LevelFilter::from(filter),
            },
            Err(err) => {
                event!(Level::DEBUG, "could not open `LOG` file: {err}");
                Self::disabled()
            }
        }
    }

    #[inline]
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            file:   None,
            filter: LevelFilter::OFF,
        }
    }

    /// Log `message` with [`tracing`], and also write it to the `LOG` file if `log_level` passes
    /// the filter.
    pub fn log(&mut self, log_level: Level, message: &str) {
        match log_level {
            Level::ERROR => event!(Level::ERROR, "{message}"),
            Level::WARN  => event!(Level::WARN, "{message}"),
            Level::INFO  => event!(Level::INFO, "{message}"),
            Level::DEBUG => event!(Level::DEBUG, "{message}"),
            _            => event!(Level::TRACE, "{message}"),
        }

        let Some(file) = &mut self.file else { return };
        if log_level <= self.filter {
            // If writing the message fails, don't bother to flush
            let err = file
                .write_all(message.as_bytes()).err()
                .or_else(|| file.write_all(b"\n").err())
                .or_else(|| file.flush().err());

            if let Some(err) = err {
                event!(Level::DEBUG, "InfoLogger could not write to `LOG` file: {err}");
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use anchored_vfs::MemoryFS;

    use super::*;


    #[test]
    fn previous_log_is_kept_as_old() {
        let fs = MemoryFS::new();
        fs.write_file(Path::new("/db/LOG"), b"first run\n");

        let mut logger = InfoLogger::open(&fs, Path::new("/db"), InfoLogLevelFilter::Warn);
        logger.log(Level::INFO, "not persisted");
        logger.log(Level::WARN, "persisted");

        assert_eq!(fs.read_file(Path::new("/db/LOG.old")).as_deref(), Some(&b"first run\n"[..]));
        assert_eq!(fs.read_file(Path::new("/db/LOG")).as_deref(), Some(&b"persisted\n"[..]));
    }

    #[test]
    fn off_leaves_log_alone() {
        let fs = MemoryFS::new();
        fs.write_file(Path::new("/db/LOG"), b"first run\n");

        let mut logger = InfoLogger::open(&fs, Path::new("/db"), InfoLogLevelFilter::Off);
        logger.log(Level::ERROR, "only traced");

        assert_eq!(fs.read_file(Path::new("/db/LOG")).as_deref(), Some(&b"first run\n"[..]));
        assert!(fs.read_file(Path::new("/db/LOG.old")).is_none());
    }
}
