//! Gzip archiving of closed log files.

use std::{
    ffi::OsString,
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use flate2::{Compression, write::GzEncoder};

use crate::LoggerError;

/// The archive path for a log file: the source path with `.gz` appended.
///
/// ```
/// use std::path::{Path, PathBuf};
///
/// assert_eq!(
///     jsonlog::archive_path(Path::new("logs/app.log")),
///     PathBuf::from("logs/app.log.gz")
/// );
/// ```
pub fn archive_path(source: &Path) -> PathBuf {
    let mut path = OsString::from(source.as_os_str());
    path.push(".gz");
    PathBuf::from(path)
}

/// Compresses `source` into `<source>.gz`, replacing any existing archive at that path.
///
/// The source file is left untouched. It must have been closed (see
/// [`Logger::close`][crate::Logger::close]) beforehand, otherwise the archive may miss records
/// that were still being written.
///
/// # Errors
///
/// Returns [`LoggerError::NotFound`] if `source` does not exist, and [`LoggerError::Io`] if
/// reading, compressing or writing fails.
pub fn compress_file(source: impl AsRef<Path>) -> Result<PathBuf, LoggerError> {
    let source = source.as_ref();
    let input = File::open(source).map_err(|error| match error.kind() {
        io::ErrorKind::NotFound => LoggerError::NotFound(source.to_path_buf()),
        _ => LoggerError::Io {
            context: "opening log file for compression",
            source: error,
        },
    })?;

    let destination = archive_path(source);
    let output =
        File::create(&destination).map_err(LoggerError::io("creating compressed file"))?;

    if let Err(error) = write_archive(input, output) {
        if let Err(cleanup_error) = fs::remove_file(&destination) {
            tracing::warn!(
                error = %cleanup_error,
                archive = %destination.display(),
                "Failed to remove incomplete archive"
            );
        }
        return Err(error);
    }

    tracing::debug!(
        source = %source.display(),
        archive = %destination.display(),
        "Compressed log file"
    );

    Ok(destination)
}

fn write_archive(input: File, output: File) -> Result<(), LoggerError> {
    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());
    io::copy(&mut BufReader::new(input), &mut encoder).map_err(LoggerError::io("compressing"))?;

    let mut writer = encoder
        .finish()
        .map_err(LoggerError::io("finishing gzip stream"))?;
    writer
        .flush()
        .map_err(LoggerError::io("flushing compressed file"))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(LoggerError::io("syncing compressed file"))
}
