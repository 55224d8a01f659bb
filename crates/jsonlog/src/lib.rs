//! `jsonlog` is a structured log sink that persists leveled, field-tagged events as
//! newline-delimited JSON.
//!
//! It offers:
//! - A [`Logger`] facade with one entry point per severity, writing to a size-rotated file and
//!   optionally mirroring a human-readable rendering to standard output.
//! - A [`RecordEncoder`] producing one canonical JSON object per event.
//! - [`compress_file`] to produce a gzip archive of a closed log file.
//! - [`read_all`], [`read_filtered`] and the streaming [`LogReader`] to decode archives, together
//!   with the [`filter_by_level`] and [`filter_by_time_range`] predicates.
//! - With the `tracing-layer` feature, a [`JsonLogLayer`] that routes [`tracing`] events into a
//!   [`Logger`].
//!
//! # Example
//!
//! ```
//! use jsonlog::{Field, Logger, LoggerConfig, filter_by_level, read_filtered};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let directory = tempfile::tempdir()?;
//! let logger = Logger::new(LoggerConfig::new(directory.path()))?;
//!
//! logger.info("User login", &[Field::string("user_id", "user123")])?;
//! logger.error("Database error", &[Field::string("error", "connection timeout")])?;
//! logger.close()?;
//!
//! let archive = logger.compress_log_file()?;
//! let errors = read_filtered(&archive, filter_by_level("error"))?;
//! assert_eq!(errors.len(), 1);
//! # Ok(())
//! # }
//! ```

mod compress;
mod console;
mod encoder;
mod field;
mod filter;
#[cfg(feature = "tracing-layer")]
mod layer;
mod level;
mod logger;
mod reader;
mod record;
mod writer;

use std::path::PathBuf;

#[cfg(feature = "tracing-layer")]
pub use self::layer::JsonLogLayer;
pub use self::{
    compress::{archive_path, compress_file},
    encoder::{LogEntry, RecordEncoder, format_timestamp},
    field::{Field, FieldMap, FieldValue},
    filter::{
        And, LevelFilter, Not, Or, RecordFilter, TimeRangeFilter, filter_by_level,
        filter_by_time_range, parse_timestamp,
    },
    level::Level,
    logger::{Logger, LoggerConfig, ProcessTerminator, Terminator},
    reader::{FilteredRecords, LogReader, read_all, read_filtered},
    record::LogRecord,
    writer::{RotatingFileWriter, RotationPolicy},
};

mod keys {
    use std::sync::LazyLock;

    use rustc_hash::FxHashSet;

    pub(crate) const TIMESTAMP: &str = "timestamp";
    pub(crate) const LEVEL: &str = "level";
    pub(crate) const CALLER: &str = "caller";
    pub(crate) const MESSAGE: &str = "message";

    pub(crate) static RESERVED_KEYS: LazyLock<FxHashSet<&'static str>> =
        LazyLock::new(|| [TIMESTAMP, LEVEL, CALLER, MESSAGE].iter().copied().collect());
}

/// Errors that can occur within the logger, the compressor and the reader.
#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// Represents an error in configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The log directory could not be created.
    #[error("Failed to create log directory `{}`: {source}", .path.display())]
    DirectoryCreation {
        /// The directory that could not be created.
        path: PathBuf,

        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Represents an I/O failure while writing, flushing, rotating, compressing or decompressing.
    #[error("I/O error while {context}: {source}")]
    Io {
        /// What the logger was doing when the failure happened.
        context: &'static str,

        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The log file or archive does not exist.
    #[error("Log file not found: `{}`", .0.display())]
    NotFound(PathBuf),

    /// The file exists but is not a valid gzip stream.
    #[error("Invalid gzip archive `{}`: {source}", .path.display())]
    InvalidArchive {
        /// The offending archive.
        path: PathBuf,

        /// The error reported by the gzip decoder.
        source: std::io::Error,
    },

    /// Represents an error during JSON serialization.
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    /// The logger was closed and no longer accepts records.
    #[error("Logger has already been closed")]
    Closed,
}

impl LoggerError {
    pub(crate) fn io(context: &'static str) -> impl FnOnce(std::io::Error) -> Self {
        move |source| Self::Io { context, source }
    }

    /// Returns `true` if this error indicates that the file to read or compress does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
