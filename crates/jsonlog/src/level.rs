//! Severity levels understood by the logger.

use std::{fmt, str::FromStr};

use crate::LoggerError;

/// The severity of a log record.
///
/// Levels are always written in lower case (`"debug"`, `"info"`, ...), regardless of how they were
/// spelled when parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Verbose diagnostic information.
    Debug,

    /// Normal operational messages.
    Info,

    /// Something unexpected that does not prevent progress.
    Warn,

    /// An operation failed.
    Error,

    /// The process cannot continue; logged right before the process exits.
    Fatal,

    /// An unrecoverable invariant violation; logged right before the process panics.
    Panic,
}

impl Level {
    /// All levels, from the least to the most severe.
    pub const ALL: [Self; 6] = [
        Self::Debug,
        Self::Info,
        Self::Warn,
        Self::Error,
        Self::Fatal,
        Self::Panic,
    ];

    /// The lower-case token written to the `level` key of a record.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
            Self::Panic => "panic",
        }
    }

    /// Parses a level token case-insensitively, falling back to [`Level::Info`] for anything
    /// unrecognized.
    ///
    /// ```
    /// use jsonlog::Level;
    ///
    /// assert_eq!(Level::parse_or_info("WARN"), Level::Warn);
    /// assert_eq!(Level::parse_or_info("verbose"), Level::Info);
    /// ```
    pub fn parse_or_info(token: &str) -> Self {
        token.parse().unwrap_or(Self::Info)
    }

    /// Returns `true` for the levels that terminate the process after logging.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Fatal | Self::Panic)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| LoggerError::Configuration(format!("Unknown log level `{s}`")))
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE | tracing::Level::DEBUG => Self::Debug,
            tracing::Level::INFO => Self::Info,
            tracing::Level::WARN => Self::Warn,
            _ => Self::Error,
        }
    }
}
