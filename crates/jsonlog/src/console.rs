//! Best-effort, human-readable mirror of log records on standard output.

use std::{
    fmt,
    io::{self, Write},
    sync::{Mutex, PoisonError},
};

use crate::{
    encoder::{LogEntry, format_timestamp},
    field::FieldMap,
};

/// `EBADF` on Unix, `ERROR_INVALID_HANDLE` on Windows.
#[cfg(unix)]
const INVALID_HANDLE_OS_ERROR: i32 = 9;
#[cfg(windows)]
const INVALID_HANDLE_OS_ERROR: i32 = 6;
#[cfg(not(any(unix, windows)))]
const INVALID_HANDLE_OS_ERROR: i32 = -1;

pub(crate) struct ConsoleSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleSink").finish_non_exhaustive()
    }
}

impl ConsoleSink {
    pub(crate) fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub(crate) fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// Writes the rendering of `entry`. Failures are ignored: the console is a secondary sink.
    pub(crate) fn write(&self, entry: &LogEntry<'_>) {
        let line = render(entry);
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writer.write_all(line.as_bytes());
    }

    /// Flushes the console, swallowing the error raised for an already-invalid output handle.
    pub(crate) fn flush(&self) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        match writer.flush() {
            Err(error) if is_invalid_handle(&error) => {
                tracing::trace!(%error, "Ignoring invalid console handle on close");
                Ok(())
            }
            result => result,
        }
    }
}

fn is_invalid_handle(error: &io::Error) -> bool {
    error.raw_os_error() == Some(INVALID_HANDLE_OS_ERROR)
}

/// Renders an entry as `timestamp<TAB>level<TAB>caller<TAB>message<TAB>fields`, where `fields`
/// is a JSON object and is omitted together with its separator when there are none.
pub(crate) fn render(entry: &LogEntry<'_>) -> String {
    let mut line = format!("{}\t{}", format_timestamp(entry.timestamp), entry.level);
    if let Some(caller) = entry.caller {
        line.push('\t');
        line.push_str(caller);
    }
    line.push('\t');
    line.push_str(entry.message);

    if !entry.fields.is_empty() {
        let fields: FieldMap = entry.fields.iter().cloned().collect();
        if let Ok(fields) = serde_json::to_string(&fields) {
            line.push('\t');
            line.push_str(&fields);
        }
    }

    line.push('\n');
    line
}
