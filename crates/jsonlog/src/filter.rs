//! Predicates over decoded log records.

use time::{
    OffsetDateTime, PrimitiveDateTime,
    format_description::{BorrowedFormatItem, well_known::Rfc3339},
    macros::format_description,
};

use crate::record::LogRecord;

/// Offset without a colon, e.g. `2025-12-02T15:59:57.317+0800`.
const COMPACT_OFFSET_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3][offset_hour sign:mandatory][offset_minute]"
);

/// UTC designator, e.g. `2025-12-02T07:59:57.317Z`.
const UTC_DESIGNATOR_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");

/// A predicate deciding whether a record is kept by a filtered read.
///
/// Implemented for every `Fn(&LogRecord) -> bool`, so closures can be used directly. Filters
/// compose with [`RecordFilter::and`], [`RecordFilter::or`] and [`RecordFilter::not`].
///
/// ```
/// use jsonlog::{LogRecord, RecordFilter, filter_by_level};
///
/// let filter = filter_by_level("error").or(filter_by_level("fatal"));
///
/// let record = LogRecord {
///     level: Some("fatal".to_string()),
///     ..LogRecord::default()
/// };
/// assert!(filter.matches(&record));
/// assert!(!filter.not().matches(&record));
/// ```
pub trait RecordFilter {
    /// Returns `true` if `record` should be kept.
    fn matches(&self, record: &LogRecord) -> bool;

    /// Keeps records matched by both `self` and `other`.
    fn and<G: RecordFilter>(self, other: G) -> And<Self, G>
    where
        Self: Sized,
    {
        And(self, other)
    }

    /// Keeps records matched by `self`, `other`, or both.
    fn or<G: RecordFilter>(self, other: G) -> Or<Self, G>
    where
        Self: Sized,
    {
        Or(self, other)
    }

    /// Keeps records not matched by `self`.
    fn not(self) -> Not<Self>
    where
        Self: Sized,
    {
        Not(self)
    }
}

impl<F> RecordFilter for F
where
    F: Fn(&LogRecord) -> bool,
{
    fn matches(&self, record: &LogRecord) -> bool {
        self(record)
    }
}

/// Conjunction of two filters, see [`RecordFilter::and`].
#[derive(Debug, Clone, Copy)]
pub struct And<A, B>(A, B);

impl<A: RecordFilter, B: RecordFilter> RecordFilter for And<A, B> {
    fn matches(&self, record: &LogRecord) -> bool {
        self.0.matches(record) && self.1.matches(record)
    }
}

/// Disjunction of two filters, see [`RecordFilter::or`].
#[derive(Debug, Clone, Copy)]
pub struct Or<A, B>(A, B);

impl<A: RecordFilter, B: RecordFilter> RecordFilter for Or<A, B> {
    fn matches(&self, record: &LogRecord) -> bool {
        self.0.matches(record) || self.1.matches(record)
    }
}

/// Negation of a filter, see [`RecordFilter::not`].
#[derive(Debug, Clone, Copy)]
pub struct Not<A>(A);

impl<A: RecordFilter> RecordFilter for Not<A> {
    fn matches(&self, record: &LogRecord) -> bool {
        !self.0.matches(record)
    }
}

/// Keeps records whose `level` equals a given string exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelFilter {
    level: String,
}

impl RecordFilter for LevelFilter {
    fn matches(&self, record: &LogRecord) -> bool {
        record.level() == Some(self.level.as_str())
    }
}

/// Keeps records whose `timestamp` lies strictly between two instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRangeFilter {
    start: OffsetDateTime,
    end: OffsetDateTime,
}

impl RecordFilter for TimeRangeFilter {
    fn matches(&self, record: &LogRecord) -> bool {
        record
            .timestamp()
            .and_then(parse_timestamp)
            .is_some_and(|timestamp| self.start < timestamp && timestamp < self.end)
    }
}

/// Creates a filter keeping records whose `level` is exactly `level`.
///
/// The comparison is case-sensitive; records without a `level` never match.
pub fn filter_by_level(level: impl Into<String>) -> LevelFilter {
    LevelFilter {
        level: level.into(),
    }
}

/// Creates a filter keeping records timestamped strictly after `start` and strictly before
/// `end`.
///
/// Records whose timestamp is missing or cannot be parsed by [`parse_timestamp`] never match.
pub fn filter_by_time_range(start: OffsetDateTime, end: OffsetDateTime) -> TimeRangeFilter {
    TimeRangeFilter { start, end }
}

/// Parses a record timestamp, trying the supported formats in order:
///
/// 1. RFC 3339 with any sub-second precision, e.g. `2025-12-02T15:59:57.317+08:00`;
/// 2. milliseconds with an offset lacking the colon, e.g. `2025-12-02T15:59:57.317+0800`;
/// 3. milliseconds with a `Z` designator, e.g. `2025-12-02T07:59:57.317Z`.
///
/// ```
/// use jsonlog::parse_timestamp;
///
/// assert_eq!(
///     parse_timestamp("2025-12-02T15:59:57.317+08:00"),
///     parse_timestamp("2025-12-02T15:59:57.317+0800"),
/// );
/// assert!(parse_timestamp("yesterday").is_none());
/// ```
pub fn parse_timestamp(timestamp: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(timestamp, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(timestamp, COMPACT_OFFSET_FORMAT))
        .or_else(|_| {
            PrimitiveDateTime::parse(timestamp, UTC_DESIGNATOR_FORMAT)
                .map(PrimitiveDateTime::assume_utc)
        })
        .ok()
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn record(level: Option<&str>, timestamp: Option<&str>) -> LogRecord {
        LogRecord {
            level: level.map(str::to_string),
            timestamp: timestamp.map(str::to_string),
            ..LogRecord::default()
        }
    }

    #[test]
    fn level_filter_is_exact_and_case_sensitive() {
        let filter = filter_by_level("error");

        assert!(filter.matches(&record(Some("error"), None)));
        assert!(!filter.matches(&record(Some("ERROR"), None)));
        assert!(!filter.matches(&record(Some("errors"), None)));
        assert!(!filter.matches(&record(None, None)));
    }

    #[test]
    fn level_filter_is_idempotent() {
        let records = [
            record(Some("info"), None),
            record(Some("error"), None),
            record(None, None),
            record(Some("error"), None),
        ];
        let filter = filter_by_level("error");

        let once: Vec<_> = records
            .iter()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        let twice: Vec<_> = once
            .iter()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();

        assert_eq!(once.len(), 2);
        assert_eq!(once, twice);
    }

    #[test]
    fn parses_all_supported_formats() {
        let expected = datetime!(2025-12-02 07:59:57.317 UTC);

        assert_eq!(parse_timestamp("2025-12-02T15:59:57.317+08:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-12-02T15:59:57.317+0800"), Some(expected));
        assert_eq!(parse_timestamp("2025-12-02T07:59:57.317Z"), Some(expected));
        assert_eq!(
            parse_timestamp("2025-12-02T07:59:57.317000123Z"),
            Some(datetime!(2025-12-02 07:59:57.317000123 UTC))
        );
        assert_eq!(
            parse_timestamp("2025-12-02T07:59:57Z"),
            Some(datetime!(2025-12-02 07:59:57 UTC))
        );
    }

    #[test]
    fn rejects_unsupported_formats() {
        assert_eq!(parse_timestamp("2025-12-02 07:59:57"), None);
        assert_eq!(parse_timestamp("1733126397"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn time_range_bounds_are_exclusive() {
        let filter = filter_by_time_range(
            datetime!(2025-12-02 08:00:00 UTC),
            datetime!(2025-12-02 09:00:00 UTC),
        );

        assert!(filter.matches(&record(None, Some("2025-12-02T08:30:00.000+00:00"))));
        assert!(filter.matches(&record(None, Some("2025-12-02T16:30:00.000+0800"))));
        assert!(!filter.matches(&record(None, Some("2025-12-02T08:00:00.000Z"))));
        assert!(!filter.matches(&record(None, Some("2025-12-02T09:00:00.000+00:00"))));
        assert!(!filter.matches(&record(None, Some("2025-12-02T10:00:00.000+00:00"))));
    }

    #[test]
    fn unparseable_or_missing_timestamps_never_match() {
        let filter = filter_by_time_range(
            datetime!(2000-01-01 00:00:00 UTC),
            datetime!(2100-01-01 00:00:00 UTC),
        );

        assert!(!filter.matches(&record(Some("info"), Some("not a timestamp"))));
        assert!(!filter.matches(&record(Some("info"), None)));
    }

    #[test]
    fn filters_compose() {
        let recent_errors = filter_by_level("error").and(filter_by_time_range(
            datetime!(2025-01-01 00:00:00 UTC),
            datetime!(2026-01-01 00:00:00 UTC),
        ));

        assert!(recent_errors.matches(&record(Some("error"), Some("2025-06-01T00:00:00Z"))));
        assert!(!recent_errors.matches(&record(Some("error"), Some("2024-06-01T00:00:00Z"))));
        assert!(!recent_errors.matches(&record(Some("info"), Some("2025-06-01T00:00:00Z"))));

        let not_debug = filter_by_level("debug").not();
        assert!(not_debug.matches(&record(Some("info"), None)));
        assert!(!not_debug.matches(&record(Some("debug"), None)));

        let has_caller = |record: &LogRecord| record.caller().is_some();
        let combined = has_caller.or(filter_by_level("warn"));
        assert!(combined.matches(&record(Some("warn"), None)));
    }
}
