//! Typed key-value fields attached to log records.

use std::{fmt, time::Duration};

use serde::{Serialize, Serializer};
use serde_json::Value;

/// The value of a field attached to a log record.
///
/// Values keep their type through encoding and decoding, with two exceptions: durations are
/// written as human-readable strings (`"125ms"`) and therefore decode as [`FieldValue::String`],
/// and non-finite floats are written as the strings `"NaN"`, `"+Inf"` and `"-Inf"`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// JSON `null`.
    Null,

    /// A boolean.
    Bool(bool),

    /// A signed integer.
    I64(i64),

    /// An unsigned integer that does not fit into an [`i64`].
    U64(u64),

    /// A floating point number.
    F64(f64),

    /// A string. Errors are recorded as their display representation.
    String(String),

    /// A duration.
    Duration(Duration),

    /// Any nested JSON value (arrays and objects).
    Nested(Value),
}

impl FieldValue {
    /// Returns the string slice if this is a [`FieldValue::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the value as an `i64` if it is an integer that fits.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I64(value) => Some(*value),
            Self::U64(value) => i64::try_from(*value).ok(),
            _ => None,
        }
    }

    /// Returns the float if this is a [`FieldValue::F64`].
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::F64(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the boolean if this is a [`FieldValue::Bool`].
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(value) => serializer.serialize_bool(*value),
            Self::I64(value) => serializer.serialize_i64(*value),
            Self::U64(value) => serializer.serialize_u64(*value),
            Self::F64(value) if value.is_nan() => serializer.serialize_str("NaN"),
            Self::F64(value) if value.is_infinite() => {
                serializer.serialize_str(if value.is_sign_positive() { "+Inf" } else { "-Inf" })
            }
            Self::F64(value) => serializer.serialize_f64(*value),
            Self::String(value) => serializer.serialize_str(value),
            Self::Duration(value) => serializer.collect_str(&format_args!("{value:?}")),
            Self::Nested(value) => value.serialize(serializer),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(value) => Self::Bool(value),
            Value::Number(number) => {
                if let Some(value) = number.as_i64() {
                    Self::I64(value)
                } else if let Some(value) = number.as_u64() {
                    Self::U64(value)
                } else {
                    number.as_f64().map_or(Self::Null, Self::F64)
                }
            }
            Value::String(value) => Self::String(value),
            nested @ (Value::Array(_) | Value::Object(_)) => Self::Nested(nested),
        }
    }
}

macro_rules! impl_from_for_field_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value.into())
                }
            }
        )*
    };
}

impl_from_for_field_value! {
    bool => Bool,
    i8 => I64,
    i16 => I64,
    i32 => I64,
    i64 => I64,
    u8 => I64,
    u16 => I64,
    u32 => I64,
    f32 => F64,
    f64 => F64,
    String => String,
    &str => String,
    Duration => Duration,
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        i64::try_from(value).map_or(Self::U64(value), Self::I64)
    }
}

/// A single key-value pair attached to a log event.
///
/// ```
/// use std::time::Duration;
///
/// use jsonlog::{Field, FieldValue};
///
/// let fields = [
///     Field::string("endpoint", "/api/users"),
///     Field::int("status_code", 201),
///     Field::duration("response_time", Duration::from_millis(125)),
///     Field::bool("success", true),
/// ];
/// assert_eq!(fields[1].value, FieldValue::I64(201));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// The JSON key of the field.
    pub key: String,

    /// The value of the field.
    pub value: FieldValue,
}

impl Field {
    /// Creates a field from any value convertible into a [`FieldValue`].
    pub fn new(key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Creates a string field.
    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, FieldValue::String(value.into()))
    }

    /// Creates a signed integer field.
    pub fn int(key: impl Into<String>, value: i64) -> Self {
        Self::new(key, FieldValue::I64(value))
    }

    /// Creates an unsigned integer field.
    pub fn uint(key: impl Into<String>, value: u64) -> Self {
        Self::new(key, value)
    }

    /// Creates a floating point field.
    pub fn float(key: impl Into<String>, value: f64) -> Self {
        Self::new(key, FieldValue::F64(value))
    }

    /// Creates a boolean field.
    pub fn bool(key: impl Into<String>, value: bool) -> Self {
        Self::new(key, FieldValue::Bool(value))
    }

    /// Creates a duration field.
    pub fn duration(key: impl Into<String>, value: Duration) -> Self {
        Self::new(key, FieldValue::Duration(value))
    }

    /// Creates a field named `error` holding the display representation of `err`.
    pub fn error(err: &dyn std::error::Error) -> Self {
        Self::named_error("error", err)
    }

    /// Creates a field holding the display representation of `err`.
    pub fn named_error(key: impl Into<String>, err: &dyn std::error::Error) -> Self {
        Self::string(key, err.to_string())
    }

    /// Creates a field holding the [`fmt::Debug`] representation of `value`.
    pub fn debug(key: impl Into<String>, value: &dyn fmt::Debug) -> Self {
        Self::string(key, format!("{value:?}"))
    }

    /// Creates a field from any serializable value.
    ///
    /// If `value` cannot be represented as JSON, its [`fmt::Debug`] representation is recorded
    /// instead, so that the event is never lost because of one exotic field.
    pub fn any<T>(key: impl Into<String>, value: &T) -> Self
    where
        T: Serialize + fmt::Debug + ?Sized,
    {
        match serde_json::to_value(value) {
            Ok(value) => Self::new(key, FieldValue::from(value)),
            Err(error) => {
                tracing::debug!(%error, "Field value is not serializable, recording its debug form");
                Self::debug(key, &value)
            }
        }
    }
}

/// An insertion-ordered map of field names to values with "last write wins" semantics.
///
/// Re-inserting an existing key replaces its value but keeps the key at its original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    entries: Vec<(String, FieldValue)>,
}

impl FieldMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from entries whose keys are known to be distinct.
    pub(crate) fn from_unique_entries(entries: Vec<(String, FieldValue)>) -> Self {
        Self { entries }
    }

    /// Inserts a field, returning the previous value stored under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) -> Option<FieldValue> {
        let key = key.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    /// Removes and returns the value stored under `key`.
    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        let position = self.entries.iter().position(|(existing, _)| existing == key)?;
        Some(self.entries.remove(position).1)
    }

    /// Returns `true` if the map contains `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// The number of fields.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value))
    }
}

impl FromIterator<Field> for FieldMap {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        let mut map = Self::new();
        for field in iter {
            map.insert(field.key, field.value);
        }
        map
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn non_finite_floats_serialize_as_strings() {
        let encoded = serde_json::to_string(&[
            FieldValue::F64(f64::NAN),
            FieldValue::F64(f64::INFINITY),
            FieldValue::F64(f64::NEG_INFINITY),
            FieldValue::F64(1.5),
        ])
        .expect("serializing field values should not fail");
        assert_eq!(encoded, r#"["NaN","+Inf","-Inf",1.5]"#);
    }

    #[test]
    fn durations_serialize_as_human_readable_strings() {
        let encoded = serde_json::to_value(FieldValue::Duration(Duration::from_millis(125)))
            .expect("serializing a duration should not fail");
        assert_eq!(encoded, json!("125ms"));
    }

    #[test]
    fn json_numbers_keep_their_type() {
        assert_eq!(FieldValue::from(json!(42)), FieldValue::I64(42));
        assert_eq!(FieldValue::from(json!(u64::MAX)), FieldValue::U64(u64::MAX));
        assert_eq!(FieldValue::from(json!(234.5)), FieldValue::F64(234.5));
        assert_eq!(
            FieldValue::from(json!({"a": [1, 2]})),
            FieldValue::Nested(json!({"a": [1, 2]}))
        );
    }

    #[test]
    fn unserializable_values_fall_back_to_debug_representation() {
        use std::collections::HashMap;

        // JSON object keys must be strings.
        let value = HashMap::from([((1, 2), "pair")]);
        let field = Field::any("exotic", &value);
        assert_eq!(field.value, FieldValue::String(format!("{value:?}")));
    }

    #[test]
    fn error_fields_record_the_display_representation() {
        let err = std::io::Error::new(std::io::ErrorKind::TimedOut, "connection timeout");
        let field = Field::error(&err);
        assert_eq!(field.key, "error");
        assert_eq!(field.value.as_str(), Some("connection timeout"));
    }

    #[test]
    fn field_map_keeps_first_position_and_last_value() {
        let map: FieldMap = [
            Field::string("a", "first"),
            Field::int("b", 2),
            Field::string("a", "second"),
        ]
        .into_iter()
        .collect();

        let entries: Vec<_> = map.iter().collect();
        assert_eq!(
            entries,
            vec![
                ("a", &FieldValue::String("second".to_string())),
                ("b", &FieldValue::I64(2)),
            ]
        );
    }

    #[test]
    fn large_unsigned_values_stay_unsigned() {
        assert_eq!(FieldValue::from(7_u64), FieldValue::I64(7));
        assert_eq!(FieldValue::from(u64::MAX), FieldValue::U64(u64::MAX));
    }
}
