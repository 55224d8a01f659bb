//! Provides the [`RecordEncoder`], which turns a log event into exactly one line of JSON.

use rustc_hash::FxHashSet;
use serde::ser::{SerializeMap, Serializer};
use time::{
    OffsetDateTime, format_description::well_known::Rfc3339, macros::format_description,
};

use crate::{
    LoggerError,
    field::{Field, FieldValue},
    keys,
    level::Level,
};

/// A log event, before encoding.
#[derive(Debug, Clone, Copy)]
pub struct LogEntry<'a> {
    /// When the event happened.
    pub timestamp: OffsetDateTime,

    /// The severity of the event.
    pub level: Level,

    /// The source location that emitted the event, in `dir/file.rs:line` form.
    pub caller: Option<&'a str>,

    /// The human-readable message.
    pub message: &'a str,

    /// Additional key-value pairs.
    pub fields: &'a [Field],
}

/// Encodes [`LogEntry`] values into newline-terminated JSON objects.
///
/// The reserved keys are always written first, in the order `timestamp`, `level`, `caller`,
/// `message`, followed by the fields in the order they were supplied. Duplicate field keys
/// collapse to the last value, and a field named after a reserved key overrides it.
///
/// ```
/// use jsonlog::{Field, Level, LogEntry, RecordEncoder};
/// use time::macros::datetime;
///
/// let line = RecordEncoder
///     .encode(&LogEntry {
///         timestamp: datetime!(2025-12-02 07:59:57.317 UTC),
///         level: Level::Info,
///         caller: None,
///         message: "User login",
///         fields: &[Field::string("user_id", "user123")],
///     })
///     .unwrap();
///
/// assert_eq!(
///     String::from_utf8(line).unwrap(),
///     "{\"timestamp\":\"2025-12-02T07:59:57.317+00:00\",\"level\":\"info\",\
///      \"message\":\"User login\",\"user_id\":\"user123\"}\n"
/// );
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordEncoder;

impl RecordEncoder {
    /// Encodes an entry into a single JSON object followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::JsonSerialization`] if the JSON serializer fails, which does not
    /// happen for in-memory buffers in practice.
    pub fn encode(&self, entry: &LogEntry<'_>) -> Result<Vec<u8>, LoggerError> {
        let mut buffer = Vec::with_capacity(256);
        let mut serializer = serde_json::Serializer::new(&mut buffer);
        let mut map_serializer = serializer.serialize_map(None)?;

        Self::serialize_reserved_fields(&mut map_serializer, entry)?;
        Self::serialize_additional_fields(&mut map_serializer, entry.fields)?;

        map_serializer.end()?;
        buffer.push(b'\n');
        Ok(buffer)
    }

    /// Serializes `timestamp`, `level`, `caller` and `message`, honouring overrides from fields.
    fn serialize_reserved_fields(
        map_serializer: &mut impl SerializeMap<Error = serde_json::Error>,
        entry: &LogEntry<'_>,
    ) -> Result<(), LoggerError> {
        match last_value(entry.fields, keys::TIMESTAMP) {
            Some(value) => map_serializer.serialize_entry(keys::TIMESTAMP, value)?,
            None => {
                map_serializer.serialize_entry(keys::TIMESTAMP, &format_timestamp(entry.timestamp))?
            }
        }

        match last_value(entry.fields, keys::LEVEL) {
            Some(FieldValue::String(level)) => {
                map_serializer.serialize_entry(keys::LEVEL, &level.to_lowercase())?
            }
            Some(value) => map_serializer.serialize_entry(keys::LEVEL, value)?,
            None => map_serializer.serialize_entry(keys::LEVEL, entry.level.as_str())?,
        }

        match (last_value(entry.fields, keys::CALLER), entry.caller) {
            (Some(value), _) => map_serializer.serialize_entry(keys::CALLER, value)?,
            (None, Some(caller)) => map_serializer.serialize_entry(keys::CALLER, caller)?,
            (None, None) => (),
        }

        match last_value(entry.fields, keys::MESSAGE) {
            Some(value) => map_serializer.serialize_entry(keys::MESSAGE, value)?,
            None => map_serializer.serialize_entry(keys::MESSAGE, entry.message)?,
        }

        Ok(())
    }

    /// Serializes the caller-supplied fields, each key once, with its last value.
    fn serialize_additional_fields(
        map_serializer: &mut impl SerializeMap<Error = serde_json::Error>,
        fields: &[Field],
    ) -> Result<(), LoggerError> {
        let mut written: FxHashSet<&str> = FxHashSet::default();

        for field in fields {
            let key = field.key.as_str();
            if keys::RESERVED_KEYS.contains(key) {
                if written.insert(key) {
                    tracing::warn!(
                        "Field `{key}` collides with a reserved key and overrides its value"
                    );
                }
            } else if written.insert(key) {
                let value = last_value(fields, key).unwrap_or(&field.value);
                map_serializer.serialize_entry(key, value)?;
            }
        }

        Ok(())
    }
}

fn last_value<'f>(fields: &'f [Field], key: &str) -> Option<&'f FieldValue> {
    fields
        .iter()
        .rev()
        .find(|field| field.key == key)
        .map(|field| &field.value)
}

/// Formats a timestamp the way it is written to the `timestamp` key of a record:
/// ISO 8601 with millisecond precision and a numeric offset containing a colon,
/// e.g. `2025-12-02T15:59:57.317+08:00`.
pub fn format_timestamp(timestamp: OffsetDateTime) -> String {
    let format = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3][offset_hour sign:mandatory]:[offset_minute]"
    );

    timestamp
        .format(&format)
        .or_else(|_| timestamp.format(&Rfc3339))
        .unwrap_or_default()
}

/// Shortens a source path to its last directory and file name, followed by the line number.
pub(crate) fn short_caller(file: &str, line: u32) -> String {
    let start = file
        .rmatch_indices(['/', '\\'])
        .nth(1)
        .map_or(0, |(index, _)| index + 1);

    format!("{}:{line}", file.get(start..).unwrap_or(file))
}
