//! Streaming decoding of gzip-compressed, newline-delimited JSON log archives.

use std::{
    collections::VecDeque,
    fmt,
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};

use flate2::bufread::MultiGzDecoder;
use serde_json::{Map, Value};

use crate::{LoggerError, filter::RecordFilter, record::LogRecord};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A streaming iterator over the records of a compressed log archive.
///
/// The archive is decompressed and decoded incrementally; at most one line is held in memory at
/// a time. Lines that do not decode as JSON objects are skipped. Each line may hold several
/// whitespace-separated objects; decoding a line stops at its first malformed object.
///
/// Decompression failures are yielded once as an `Err` item, after which the iterator ends.
pub struct LogReader {
    path: PathBuf,
    reader: BufReader<MultiGzDecoder<BufReader<File>>>,
    line: Vec<u8>,
    line_number: u64,
    pending: VecDeque<LogRecord>,
    finished: bool,
}

impl fmt::Debug for LogReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogReader")
            .field("path", &self.path)
            .field("line_number", &self.line_number)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl LogReader {
    /// Opens a gzip archive for reading.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::NotFound`] if the archive does not exist,
    /// [`LoggerError::InvalidArchive`] if it does not start with a valid gzip header, and
    /// [`LoggerError::Io`] if it cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LoggerError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|error| match error.kind() {
            io::ErrorKind::NotFound => LoggerError::NotFound(path.clone()),
            _ => LoggerError::Io {
                context: "opening compressed file",
                source: error,
            },
        })?;

        let mut compressed = BufReader::new(file);
        let header = compressed
            .fill_buf()
            .map_err(LoggerError::io("reading compressed file"))?;
        if !header.starts_with(&GZIP_MAGIC) {
            return Err(LoggerError::InvalidArchive {
                path,
                source: io::Error::new(io::ErrorKind::InvalidData, "missing gzip header"),
            });
        }

        // Decoding the first chunk parses the full gzip header.
        let mut reader = BufReader::new(MultiGzDecoder::new(compressed));
        if let Err(source) = reader.fill_buf() {
            return Err(LoggerError::InvalidArchive { path, source });
        }

        Ok(Self {
            path,
            reader,
            line: Vec::new(),
            line_number: 0,
            pending: VecDeque::new(),
            finished: false,
        })
    }

    /// The path of the archive being read.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Restricts the iterator to records matching `filter`.
    pub fn filtered<F: RecordFilter>(self, filter: F) -> FilteredRecords<F> {
        FilteredRecords {
            reader: self,
            filter,
        }
    }

    /// Decodes the current line into `pending`, dropping whatever fails to decode.
    fn decode_line(&mut self) {
        let objects =
            serde_json::Deserializer::from_slice(&self.line).into_iter::<Map<String, Value>>();

        for object in objects {
            match object {
                Ok(object) => self.pending.push_back(LogRecord::from_json_object(object)),
                Err(error) => {
                    tracing::debug!(
                        path = %self.path.display(),
                        line = self.line_number,
                        %error,
                        "Skipping malformed log record"
                    );
                    break;
                }
            }
        }
    }
}

impl Iterator for LogReader {
    type Item = Result<LogRecord, LoggerError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(Ok(record));
            }
            if self.finished {
                return None;
            }

            self.line.clear();
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => self.finished = true,
                Ok(_) => {
                    self.line_number += 1;
                    self.decode_line();
                }
                Err(error) => {
                    self.finished = true;
                    return Some(Err(LoggerError::Io {
                        context: "decompressing log archive",
                        source: error,
                    }));
                }
            }
        }
    }
}

/// An iterator over the records of a [`LogReader`] that match a [`RecordFilter`].
#[derive(Debug)]
pub struct FilteredRecords<F> {
    reader: LogReader,
    filter: F,
}

impl<F: RecordFilter> Iterator for FilteredRecords<F> {
    type Item = Result<LogRecord, LoggerError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.by_ref().find(|item| match item {
            Ok(record) => self.filter.matches(record),
            Err(_) => true,
        })
    }
}

/// Reads every record of a compressed log archive, in file order.
///
/// # Errors
///
/// See [`LogReader::open`]; additionally returns [`LoggerError::Io`] if decompression fails
/// part-way through the archive.
pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<LogRecord>, LoggerError> {
    LogReader::open(path)?.collect()
}

/// Reads the records of a compressed log archive that match `filter`, in file order.
///
/// # Errors
///
/// Same as [`read_all`].
pub fn read_filtered<F: RecordFilter>(
    path: impl AsRef<Path>,
    filter: F,
) -> Result<Vec<LogRecord>, LoggerError> {
    LogReader::open(path)?.filtered(filter).collect()
}
