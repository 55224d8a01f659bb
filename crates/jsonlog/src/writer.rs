//! The durable, size-rotated file destination.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, SystemTime},
};

use crate::LoggerError;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Limits enforced on the active log file and its rotated backups.
///
/// A value of `0` disables the corresponding limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// The active file is rotated before an append would grow it beyond this many bytes.
    pub max_size_bytes: u64,

    /// Maximum number of rotated backups to keep; the oldest are deleted first.
    pub max_backups: usize,

    /// Backups last modified more than this many days ago are deleted regardless of count.
    pub max_age_days: u64,
}

impl RotationPolicy {
    /// 100 MiB.
    pub const DEFAULT_MAX_SIZE_BYTES: u64 = 100 * 1024 * 1024;

    /// Three backups.
    pub const DEFAULT_MAX_BACKUPS: usize = 3;

    /// Four weeks.
    pub const DEFAULT_MAX_AGE_DAYS: u64 = 28;

    /// A policy that never rotates and never deletes backups.
    pub fn disabled() -> Self {
        Self {
            max_size_bytes: 0,
            max_backups: 0,
            max_age_days: 0,
        }
    }

    fn max_age(&self) -> Option<Duration> {
        (self.max_age_days > 0)
            .then(|| Duration::from_secs(self.max_age_days.saturating_mul(SECONDS_PER_DAY)))
    }

    fn should_rotate(&self, current_size: u64, incoming: u64) -> bool {
        self.max_size_bytes > 0
            && current_size > 0
            && current_size.saturating_add(incoming) > self.max_size_bytes
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_size_bytes: Self::DEFAULT_MAX_SIZE_BYTES,
            max_backups: Self::DEFAULT_MAX_BACKUPS,
            max_age_days: Self::DEFAULT_MAX_AGE_DAYS,
        }
    }
}

#[derive(Debug)]
struct WriterState {
    /// `None` once closed, or after a rotation failed to reopen the file.
    file: Option<File>,
    size: u64,
    closed: bool,
}

/// Owns the active log file and appends complete records to it.
///
/// Appends from concurrent callers are serialized by an internal lock, and every record is
/// written with a single `write_all` call, so records never interleave. When an append would
/// push the file beyond [`RotationPolicy::max_size_bytes`], the file is renamed to
/// `<name>.1.<ext>` (older backups shift to `.2`, `.3`, ...) and a fresh file is opened at the
/// original path.
///
/// ```
/// use jsonlog::{RotatingFileWriter, RotationPolicy};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let directory = tempfile::tempdir()?;
/// let writer = RotatingFileWriter::open(directory.path().join("app.log"), RotationPolicy::default())?;
///
/// writer.append(b"{\"message\":\"hello\"}\n")?;
/// writer.close()?;
/// assert!(writer.append(b"{}\n").is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RotatingFileWriter {
    path: PathBuf,
    policy: RotationPolicy,
    state: Mutex<WriterState>,
}

impl RotatingFileWriter {
    /// Opens (or creates) the file at `path` for appending, creating its parent directory if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::DirectoryCreation`] if the parent directory cannot be created and
    /// [`LoggerError::Io`] if the file cannot be opened for appending.
    pub fn open(path: impl Into<PathBuf>, policy: RotationPolicy) -> Result<Self, LoggerError> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| LoggerError::DirectoryCreation {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file = open_append(&path)?;
        let size = file
            .metadata()
            .map_err(LoggerError::io("reading log file metadata"))?
            .len();

        let writer = Self {
            path,
            policy,
            state: Mutex::new(WriterState {
                file: Some(file),
                size,
                closed: false,
            }),
        };
        writer.prune_backups(1);

        Ok(writer)
    }

    /// The path of the active log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The rotation policy enforced by this writer.
    pub fn policy(&self) -> RotationPolicy {
        self.policy
    }

    /// Returns `true` once [`RotatingFileWriter::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Appends one complete record, rotating the file first if required.
    ///
    /// If an earlier rotation could not reopen the file, reopening is retried first.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::Closed`] after [`RotatingFileWriter::close`], and
    /// [`LoggerError::Io`] if reopening, rotating or writing fails.
    pub fn append(&self, record: &[u8]) -> Result<(), LoggerError> {
        let incoming = u64::try_from(record.len()).unwrap_or(u64::MAX);
        let mut state = self.lock();

        if state.closed {
            return Err(LoggerError::Closed);
        }
        if state.file.is_none() {
            reopen(&self.path, &mut state)?;
            tracing::debug!(path = %self.path.display(), "Reopened log file");
        }

        if self.policy.should_rotate(state.size, incoming) {
            self.rotate(&mut state)?;
        }

        let file = state.file.as_mut().ok_or_else(|| LoggerError::Io {
            context: "writing log record",
            source: io::Error::other("log file is not open"),
        })?;
        file.write_all(record)
            .map_err(LoggerError::io("writing log record"))?;
        state.size = state.size.saturating_add(incoming);

        Ok(())
    }

    /// Flushes written records to stable storage without closing the file.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::Io`] if syncing fails. Flushing a closed writer is a no-op.
    pub fn flush(&self) -> Result<(), LoggerError> {
        match self.lock().file.as_mut() {
            Some(file) => file.sync_data().map_err(LoggerError::io("syncing log file")),
            None => Ok(()),
        }
    }

    /// Flushes the file to stable storage and releases the handle.
    ///
    /// Calling this more than once is harmless; later calls do nothing.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::Io`] if syncing the file fails. The handle is released either way.
    pub fn close(&self) -> Result<(), LoggerError> {
        let file = {
            let mut state = self.lock();
            state.closed = true;
            state.file.take()
        };
        match file {
            Some(file) => file.sync_all().map_err(LoggerError::io("closing log file")),
            None => Ok(()),
        }
    }

    /// Lists the rotated backups that currently exist, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::Io`] if the log directory cannot be read.
    pub fn backups(&self) -> Result<Vec<PathBuf>, LoggerError> {
        Ok(self
            .backup_indices()?
            .into_iter()
            .map(|index| backup_path(&self.path, index))
            .collect())
    }

    fn lock(&self) -> MutexGuard<'_, WriterState> {
        // Every record is a single `write_all`, so the state is usable even after a panic.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rotate(&self, state: &mut WriterState) -> Result<(), LoggerError> {
        if let Some(file) = state.file.as_ref() {
            file.sync_all()
                .map_err(LoggerError::io("syncing log file before rotation"))?;
        }
        state.file = None;

        let renamed = self.shift_backups().and_then(|()| {
            fs::rename(&self.path, backup_path(&self.path, 1))
                .map_err(LoggerError::io("renaming log file during rotation"))
        });

        // Reopen at the original path even if renaming failed, so logging can continue.
        // A failed reopen is retried by the next append.
        reopen(&self.path, state)?;
        renamed?;

        tracing::debug!(path = %self.path.display(), "Rotated log file");
        self.prune_backups(2);

        Ok(())
    }

    /// Moves `<name>.<n>.<ext>` to `<name>.<n + 1>.<ext>`, deleting backups that would exceed
    /// the retention count.
    fn shift_backups(&self) -> Result<(), LoggerError> {
        let max_backups = self.policy.max_backups;

        for index in self.backup_indices()? {
            let from = backup_path(&self.path, index);
            if max_backups > 0 && usize::try_from(index).map_or(true, |index| index >= max_backups)
            {
                fs::remove_file(&from).map_err(LoggerError::io("deleting old backup"))?;
            } else {
                let to = backup_path(&self.path, index.saturating_add(1));
                fs::rename(&from, &to).map_err(LoggerError::io("shifting backup"))?;
            }
        }

        Ok(())
    }

    /// Deletes backups older than the configured age, skipping indices below `keep_below`.
    ///
    /// Cleanup is best-effort: failures are logged and otherwise ignored.
    fn prune_backups(&self, keep_below: u32) {
        let Some(max_age) = self.policy.max_age() else {
            return;
        };
        let indices = match self.backup_indices() {
            Ok(indices) => indices,
            Err(error) => {
                tracing::warn!(%error, "Failed to list log backups for pruning");
                return;
            }
        };
        let now = SystemTime::now();

        for index in indices.into_iter().filter(|index| *index >= keep_below) {
            let path = backup_path(&self.path, index);
            let expired = fs::metadata(&path)
                .and_then(|metadata| metadata.modified())
                .map(|modified| now.duration_since(modified).unwrap_or_default() > max_age)
                .unwrap_or(false);

            if expired {
                match fs::remove_file(&path) {
                    Ok(()) => tracing::debug!(path = %path.display(), "Deleted expired log backup"),
                    Err(error) => {
                        tracing::warn!(%error, path = %path.display(), "Failed to delete log backup")
                    }
                }
            }
        }
    }

    /// Indices of existing backups, highest (oldest) first.
    fn backup_indices(&self) -> Result<Vec<u32>, LoggerError> {
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let (stem, extension) = split_file_name(&self.path);

        let mut indices = Vec::new();
        for entry in fs::read_dir(directory).map_err(LoggerError::io("listing log directory"))? {
            let entry = entry.map_err(LoggerError::io("listing log directory"))?;
            if let Some(index) = entry
                .file_name()
                .to_str()
                .and_then(|name| backup_index(name, &stem, extension.as_deref()))
            {
                indices.push(index);
            }
        }

        indices.sort_unstable_by(|a, b| b.cmp(a));
        Ok(indices)
    }
}

fn reopen(path: &Path, state: &mut WriterState) -> Result<(), LoggerError> {
    let file = open_append(path)?;
    state.size = file.metadata().map(|metadata| metadata.len()).unwrap_or(0);
    state.file = Some(file);
    Ok(())
}

fn open_append(path: &Path) -> Result<File, LoggerError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(LoggerError::io("opening log file"))
}

fn split_file_name(path: &Path) -> (String, Option<String>) {
    let stem = path
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned();
    let extension = path
        .extension()
        .map(|extension| extension.to_string_lossy().into_owned());
    (stem, extension)
}

/// The path of the backup with the given index: `app.log` becomes `app.<index>.log`.
pub(crate) fn backup_path(base: &Path, index: u32) -> PathBuf {
    let (stem, extension) = split_file_name(base);
    let name = match extension {
        Some(extension) => format!("{stem}.{index}.{extension}"),
        None => format!("{stem}.{index}"),
    };
    base.with_file_name(name)
}

fn backup_index(file_name: &str, stem: &str, extension: Option<&str>) -> Option<u32> {
    let rest = file_name.strip_prefix(stem)?.strip_prefix('.')?;
    let digits = match extension {
        Some(extension) => rest.strip_suffix(extension)?.strip_suffix('.')?,
        None => rest,
    };

    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|index| *index > 0)
}
