//! The [`Logger`] facade: one entry point per severity over a rotating JSON file.

use std::{
    fmt, io,
    panic::Location,
    path::{Path, PathBuf},
};

use time::OffsetDateTime;

use crate::{
    LoggerError,
    compress::compress_file,
    console::ConsoleSink,
    encoder::{LogEntry, RecordEncoder, short_caller},
    field::Field,
    level::Level,
    writer::{RotatingFileWriter, RotationPolicy},
};

const DEFAULT_FILE_NAME_PREFIX: &str = "app";

/// Configuration for a [`Logger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerConfig {
    /// Directory holding the active log file and its backups. Created if it does not exist.
    pub directory: PathBuf,

    /// Base name of the log file; records are written to `<directory>/<prefix>.log`.
    pub file_name_prefix: String,

    /// Mirror every record as a human-readable line on standard output.
    pub enable_console_output: bool,

    /// Compress the log file into `<prefix>.log.gz` when the logger is closed.
    pub compress_on_close: bool,

    /// When to rotate the active file and how many backups to keep.
    pub rotation: RotationPolicy,
}

impl LoggerConfig {
    /// Creates a configuration writing to `directory` with default settings for everything else.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// The path of the active log file.
    pub fn log_file_path(&self) -> PathBuf {
        let prefix = if self.file_name_prefix.is_empty() {
            DEFAULT_FILE_NAME_PREFIX
        } else {
            self.file_name_prefix.as_str()
        };
        self.directory.join(format!("{prefix}.log"))
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::new(),
            file_name_prefix: DEFAULT_FILE_NAME_PREFIX.to_string(),
            enable_console_output: false,
            compress_on_close: false,
            rotation: RotationPolicy::default(),
        }
    }
}

/// Ends the process after a `fatal` or `panic` record has been persisted.
///
/// [`ProcessTerminator`] is used unless another one is installed with
/// [`Logger::with_terminator`].
pub trait Terminator: fmt::Debug + Send + Sync {
    /// Called after a `fatal` record. Must not return.
    fn exit(&self, code: i32) -> !;

    /// Called after a `panic` record. Must not return.
    fn abort(&self, message: &str) -> !;
}

/// Exits the process on `fatal` and panics the calling thread on `panic`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessTerminator;

impl Terminator for ProcessTerminator {
    fn exit(&self, code: i32) -> ! {
        std::process::exit(code)
    }

    #[allow(clippy::panic)]
    fn abort(&self, message: &str) -> ! {
        panic!("{message}")
    }
}

/// A structured logger writing newline-delimited JSON records to a size-rotated file.
///
/// `Logger` is `Send + Sync`; share it between threads with an [`Arc`](std::sync::Arc). Each
/// record is written with a single locked write, so concurrent records never interleave.
///
/// ```
/// use jsonlog::{Field, Logger, LoggerConfig};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let directory = tempfile::tempdir()?;
/// let logger = Logger::new(LoggerConfig::new(directory.path()))?;
///
/// logger.warn("Disk usage high", &[Field::uint("percent", 91_u64)])?;
/// logger.log_with_level("ERROR", "Disk full", &[])?;
/// logger.close()?;
///
/// let content = std::fs::read_to_string(logger.path())?;
/// assert_eq!(content.lines().count(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Logger {
    file: RotatingFileWriter,
    console: Option<ConsoleSink>,
    encoder: RecordEncoder,
    terminator: Box<dyn Terminator>,
    compress_on_close: bool,
}

impl Logger {
    /// Creates the log directory if needed and opens `<directory>/<prefix>.log` for appending.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::Configuration`] if no directory is configured,
    /// [`LoggerError::DirectoryCreation`] if the directory cannot be created and
    /// [`LoggerError::Io`] if the log file cannot be opened.
    pub fn new(config: LoggerConfig) -> Result<Self, LoggerError> {
        if config.directory.as_os_str().is_empty() {
            return Err(LoggerError::Configuration(
                "log directory must not be empty".to_string(),
            ));
        }

        let file = RotatingFileWriter::open(config.log_file_path(), config.rotation)?;
        tracing::debug!(path = %file.path().display(), "Opened log file");

        Ok(Self {
            file,
            console: config.enable_console_output.then(ConsoleSink::stdout),
            encoder: RecordEncoder,
            terminator: Box::new(ProcessTerminator),
            compress_on_close: config.compress_on_close,
        })
    }

    /// Mirrors records to `writer` instead of standard output, enabling console output.
    pub fn with_console_writer(mut self, writer: impl io::Write + Send + 'static) -> Self {
        self.console = Some(ConsoleSink::new(writer));
        self
    }

    /// Replaces the [`Terminator`] invoked by [`Logger::fatal`] and [`Logger::panic`].
    pub fn with_terminator(mut self, terminator: impl Terminator + 'static) -> Self {
        self.terminator = Box::new(terminator);
        self
    }

    /// The path of the active log file.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Returns `true` once [`Logger::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.file.is_closed()
    }

    /// Writes a `debug` record.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::Closed`] after [`Logger::close`], and [`LoggerError::Io`] if the
    /// record cannot be written or the file cannot be rotated.
    #[track_caller]
    pub fn debug(&self, message: &str, fields: &[Field]) -> Result<(), LoggerError> {
        self.log_at(Level::Debug, Location::caller(), message, fields)
    }

    /// Writes an `info` record.
    ///
    /// # Errors
    ///
    /// Same as [`Logger::debug`].
    #[track_caller]
    pub fn info(&self, message: &str, fields: &[Field]) -> Result<(), LoggerError> {
        self.log_at(Level::Info, Location::caller(), message, fields)
    }

    /// Writes a `warn` record.
    ///
    /// # Errors
    ///
    /// Same as [`Logger::debug`].
    #[track_caller]
    pub fn warn(&self, message: &str, fields: &[Field]) -> Result<(), LoggerError> {
        self.log_at(Level::Warn, Location::caller(), message, fields)
    }

    /// Writes an `error` record.
    ///
    /// # Errors
    ///
    /// Same as [`Logger::debug`].
    #[track_caller]
    pub fn error(&self, message: &str, fields: &[Field]) -> Result<(), LoggerError> {
        self.log_at(Level::Error, Location::caller(), message, fields)
    }

    /// Writes a `fatal` record, closes the logger and exits with status 1 through the installed
    /// [`Terminator`].
    #[track_caller]
    pub fn fatal(&self, message: &str, fields: &[Field]) -> ! {
        self.persist_before_termination(Level::Fatal, Location::caller(), message, fields);
        self.terminator.exit(1)
    }

    /// Writes a `panic` record, closes the logger and aborts through the installed
    /// [`Terminator`], which panics with `message` by default.
    #[track_caller]
    pub fn panic(&self, message: &str, fields: &[Field]) -> ! {
        self.persist_before_termination(Level::Panic, Location::caller(), message, fields);
        self.terminator.abort(message)
    }

    /// Writes a record at `level`.
    ///
    /// [`Level::Fatal`] and [`Level::Panic`] escalate exactly as [`Logger::fatal`] and
    /// [`Logger::panic`] do.
    ///
    /// # Errors
    ///
    /// Same as [`Logger::debug`].
    #[track_caller]
    pub fn log(&self, level: Level, message: &str, fields: &[Field]) -> Result<(), LoggerError> {
        match level {
            Level::Fatal => self.fatal(message, fields),
            Level::Panic => self.panic(message, fields),
            level => self.log_at(level, Location::caller(), message, fields),
        }
    }

    /// Writes a record at the level named by `level`, matched case-insensitively.
    ///
    /// Unrecognized names fall back to `info`.
    ///
    /// # Errors
    ///
    /// Same as [`Logger::debug`].
    #[track_caller]
    pub fn log_with_level(
        &self,
        level: &str,
        message: &str,
        fields: &[Field],
    ) -> Result<(), LoggerError> {
        self.log(Level::parse_or_info(level), message, fields)
    }

    /// Forces buffered data of the log file to disk. Does nothing once the logger is closed.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::Io`] if syncing the file or flushing console output fails.
    pub fn flush(&self) -> Result<(), LoggerError> {
        self.file.flush()?;
        if let Some(console) = &self.console {
            console
                .flush()
                .map_err(LoggerError::io("flushing console output"))?;
        }
        Ok(())
    }

    /// Flushes and closes the log file, then flushes console output.
    ///
    /// When `compress_on_close` is configured, the closed file is also compressed. Calling
    /// `close` again has no effect.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::Io`] if the file cannot be synced, console output cannot be flushed
    /// or compression fails.
    pub fn close(&self) -> Result<(), LoggerError> {
        let was_open = !self.file.is_closed();
        let file_result = self.file.close();

        let console_result = match &self.console {
            Some(console) => console
                .flush()
                .map_err(LoggerError::io("flushing console output")),
            None => Ok(()),
        };

        file_result?;
        console_result?;

        if was_open && self.compress_on_close {
            self.compress_log_file()?;
        }
        Ok(())
    }

    /// Compresses the log file into `<path>.gz`, leaving the log file untouched.
    ///
    /// The logger should be closed first, otherwise concurrent records may be missed.
    ///
    /// # Errors
    ///
    /// See [`compress_file`][crate::compress_file].
    pub fn compress_log_file(&self) -> Result<PathBuf, LoggerError> {
        compress_file(self.file.path())
    }

    /// Encodes and writes `entry`, mirroring it to the console regardless of the outcome.
    pub(crate) fn write_entry(&self, entry: &LogEntry<'_>) -> Result<(), LoggerError> {
        let result = self
            .encoder
            .encode(entry)
            .and_then(|record| self.file.append(&record));

        if let Some(console) = &self.console {
            console.write(entry);
        }
        result
    }

    fn log_at(
        &self,
        level: Level,
        location: &Location<'_>,
        message: &str,
        fields: &[Field],
    ) -> Result<(), LoggerError> {
        let caller = short_caller(location.file(), location.line());
        self.write_entry(&LogEntry {
            timestamp: OffsetDateTime::now_utc(),
            level,
            caller: Some(&caller),
            message,
            fields,
        })
    }

    fn persist_before_termination(
        &self,
        level: Level,
        location: &Location<'_>,
        message: &str,
        fields: &[Field],
    ) {
        if let Err(error) = self.log_at(level, location, message, fields) {
            tracing::error!(%error, %level, "Failed to persist record before termination");
        }
        if let Err(error) = self.close() {
            tracing::error!(%error, "Failed to close logger before termination");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        panic::{AssertUnwindSafe, catch_unwind},
        sync::{Arc, Mutex},
    };

    use serde_json::Value;

    use super::*;

    #[derive(Debug)]
    struct PanickingTerminator;

    impl Terminator for PanickingTerminator {
        fn exit(&self, code: i32) -> ! {
            panic!("exit({code})")
        }

        fn abort(&self, message: &str) -> ! {
            panic!("abort: {message}")
        }
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().expect("buffer lock poisoned").clone())
                .expect("console output should be UTF-8")
        }
    }

    impl io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("buffer lock poisoned").write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn records(path: &Path) -> Vec<Value> {
        fs::read_to_string(path)
            .expect("failed to read log file")
            .lines()
            .map(|line| serde_json::from_str(line).expect("log line should be JSON"))
            .collect()
    }

    fn logger(directory: &Path) -> Logger {
        Logger::new(LoggerConfig::new(directory))
            .expect("failed to create logger")
            .with_terminator(PanickingTerminator)
    }

    #[test]
    fn logger_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Logger>();
    }

    #[test]
    fn empty_directory_is_a_configuration_error() {
        let result = Logger::new(LoggerConfig::default());
        assert!(matches!(result, Err(LoggerError::Configuration(_))));
    }

    #[test]
    fn creates_the_directory_and_default_file_name() {
        let directory = tempfile::tempdir().expect("failed to create temp dir");
        let nested = directory.path().join("nested").join("logs");

        let logger = Logger::new(LoggerConfig::new(&nested)).expect("failed to create logger");

        assert_eq!(logger.path(), nested.join("app.log"));
        assert!(logger.path().exists());
    }

    #[test]
    fn file_name_prefix_is_applied() {
        let directory = tempfile::tempdir().expect("failed to create temp dir");
        let config = LoggerConfig {
            file_name_prefix: "service".to_string(),
            ..LoggerConfig::new(directory.path())
        };

        let logger = Logger::new(config).expect("failed to create logger");
        assert_eq!(logger.path(), directory.path().join("service.log"));
    }

    #[test]
    fn each_severity_writes_one_record_with_caller() {
        let directory = tempfile::tempdir().expect("failed to create temp dir");
        let logger = logger(directory.path());

        logger.debug("d", &[]).expect("failed to log");
        logger.info("i", &[Field::int("attempt", 2)]).expect("failed to log");
        logger.warn("w", &[]).expect("failed to log");
        logger.error("e", &[Field::error(&io::Error::other("boom"))]).expect("failed to log");
        logger.close().expect("failed to close");

        let records = records(logger.path());
        let levels: Vec<_> = records.iter().map(|record| record["level"].clone()).collect();
        assert_eq!(levels, ["debug", "info", "warn", "error"]);
        assert_eq!(records[1]["attempt"], 2);
        assert_eq!(records[3]["error"], "boom");

        let caller = records[0]["caller"].as_str().expect("caller should be a string");
        assert!(caller.starts_with("src/logger.rs:"), "unexpected caller {caller}");
    }

    #[test]
    fn log_with_level_parses_names_and_defaults_to_info() {
        let directory = tempfile::tempdir().expect("failed to create temp dir");
        let logger = logger(directory.path());

        logger.log_with_level("WARN", "a", &[]).expect("failed to log");
        logger.log_with_level(" error ", "b", &[]).expect("failed to log");
        logger.log_with_level("verbose", "c", &[]).expect("failed to log");
        logger.log_with_level("", "d", &[]).expect("failed to log");
        logger.close().expect("failed to close");

        let levels: Vec<_> = records(logger.path())
            .iter()
            .map(|record| record["level"].clone())
            .collect();
        assert_eq!(levels, ["warn", "error", "info", "info"]);
    }

    #[test]
    fn fatal_persists_closes_and_exits_with_status_one() {
        let directory = tempfile::tempdir().expect("failed to create temp dir");
        let logger = logger(directory.path());

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            logger.fatal("Unrecoverable", &[Field::string("component", "db")])
        }));

        let payload = outcome.expect_err("fatal should not return");
        assert_eq!(payload.downcast_ref::<String>().map(String::as_str), Some("exit(1)"));
        assert!(logger.is_closed());

        let records = records(logger.path());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["level"], "fatal");
        assert_eq!(records[0]["component"], "db");
    }

    #[test]
    fn panic_level_through_log_with_level_aborts_with_message() {
        let directory = tempfile::tempdir().expect("failed to create temp dir");
        let logger = logger(directory.path());

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            logger.log_with_level("PANIC", "Invariant broken", &[])
        }));

        let payload = outcome.expect_err("panic should not return");
        assert_eq!(
            payload.downcast_ref::<String>().map(String::as_str),
            Some("abort: Invariant broken")
        );
        assert_eq!(records(logger.path())[0]["level"], "panic");
    }

    #[test]
    fn process_terminator_panics_with_the_message() {
        let directory = tempfile::tempdir().expect("failed to create temp dir");
        let logger = Logger::new(LoggerConfig::new(directory.path())).expect("failed to create");

        let outcome = catch_unwind(AssertUnwindSafe(|| logger.panic("boom", &[])));

        let payload = outcome.expect_err("panic should not return");
        assert_eq!(payload.downcast_ref::<String>().map(String::as_str), Some("boom"));
        assert_eq!(records(logger.path())[0]["message"], "boom");
    }

    #[test]
    fn console_is_written_even_when_the_file_write_fails() {
        let directory = tempfile::tempdir().expect("failed to create temp dir");
        let console = SharedBuffer::default();
        let logger = logger(directory.path()).with_console_writer(console.clone());

        logger.info("before close", &[]).expect("failed to log");
        logger.close().expect("failed to close");
        let result = logger.info("after close", &[]);

        assert!(matches!(result, Err(LoggerError::Closed)));
        let output = console.contents();
        assert!(output.contains("\tinfo\t"));
        assert!(output.contains("before close"));
        assert!(output.contains("after close"));
        assert_eq!(records(logger.path()).len(), 1);
    }

    #[test]
    fn close_is_idempotent() {
        let directory = tempfile::tempdir().expect("failed to create temp dir");
        let logger = logger(directory.path());

        logger.info("one", &[]).expect("failed to log");
        logger.close().expect("first close should succeed");
        logger.close().expect("second close should succeed");
        assert!(logger.is_closed());
        logger.flush().expect("flushing a closed logger should be a no-op");
    }

    #[test]
    fn compress_on_close_writes_an_archive() {
        let directory = tempfile::tempdir().expect("failed to create temp dir");
        let config = LoggerConfig {
            compress_on_close: true,
            ..LoggerConfig::new(directory.path())
        };
        let logger = Logger::new(config).expect("failed to create logger");

        logger.info("archived", &[]).expect("failed to log");
        logger.close().expect("failed to close");

        let archived = crate::read_all(directory.path().join("app.log.gz"))
            .expect("archive should be readable");
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].message(), Some("archived"));
    }

    #[test]
    fn compress_log_file_without_records_yields_an_empty_archive() {
        let directory = tempfile::tempdir().expect("failed to create temp dir");
        let logger = logger(directory.path());
        logger.close().expect("failed to close");

        let archive = logger.compress_log_file().expect("failed to compress");
        assert!(crate::read_all(archive).expect("archive should be readable").is_empty());
    }
}
