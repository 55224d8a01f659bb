//! Decoded log records.

use serde_json::{Map, Value};

use crate::{
    field::{FieldMap, FieldValue},
    keys,
};

/// One decoded JSON log line.
///
/// The reserved keys are lifted into dedicated attributes; every other key ends up in
/// [`LogRecord::fields`] in file order. A reserved key holding a non-string value is treated as
/// absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogRecord {
    /// The raw `timestamp` string, as written.
    pub timestamp: Option<String>,

    /// The raw `level` string, as written.
    pub level: Option<String>,

    /// The `message` string.
    pub message: Option<String>,

    /// The `caller` source location, if recorded.
    pub caller: Option<String>,

    /// All remaining keys.
    pub fields: FieldMap,
}

impl LogRecord {
    /// Builds a record out of a decoded JSON object.
    pub fn from_json_object(object: Map<String, Value>) -> Self {
        let mut record = Self::default();
        let mut fields = Vec::with_capacity(object.len());
        for (key, value) in object {
            match key.as_str() {
                keys::TIMESTAMP => record.timestamp = into_string(value),
                keys::LEVEL => record.level = into_string(value),
                keys::MESSAGE => record.message = into_string(value),
                keys::CALLER => record.caller = into_string(value),
                _ => fields.push((key, FieldValue::from(value))),
            }
        }
        // JSON object keys are already unique.
        record.fields = FieldMap::from_unique_entries(fields);
        record
    }

    /// The `level` of the record.
    pub fn level(&self) -> Option<&str> {
        self.level.as_deref()
    }

    /// The `timestamp` of the record.
    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    /// The `message` of the record.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// The `caller` of the record.
    pub fn caller(&self) -> Option<&str> {
        self.caller.as_deref()
    }

    /// Looks up a non-reserved field.
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }
}

fn into_string(value: Value) -> Option<String> {
    match value {
        Value::String(value) => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected a JSON object, got {other}"),
        }
    }

    #[test]
    fn reserved_keys_are_lifted_out_of_fields() {
        let record = LogRecord::from_json_object(object(json!({
            "timestamp": "2025-12-02T15:59:57.317+08:00",
            "level": "info",
            "caller": "src/main.rs:10",
            "message": "User login",
            "user_id": "user123",
            "attempt": 2,
        })));

        assert_eq!(record.level(), Some("info"));
        assert_eq!(record.message(), Some("User login"));
        assert_eq!(record.caller(), Some("src/main.rs:10"));
        assert_eq!(record.timestamp(), Some("2025-12-02T15:59:57.317+08:00"));
        assert_eq!(record.fields.len(), 2);
        assert_eq!(record.field("attempt"), Some(&FieldValue::I64(2)));
        assert!(record.field("level").is_none());
    }

    #[test]
    fn wide_records_keep_every_field_in_file_order() {
        let object: Map<String, Value> = (0..2000)
            .map(|index| (format!("field_{index}"), json!(index)))
            .collect();

        let record = LogRecord::from_json_object(object);

        assert_eq!(record.fields.len(), 2000);
        let keys: Vec<_> = record.fields.iter().map(|(key, _)| key.to_string()).collect();
        let expected: Vec<_> = (0..2000).map(|index| format!("field_{index}")).collect();
        assert_eq!(keys, expected);
        assert_eq!(record.field("field_1999"), Some(&FieldValue::I64(1999)));
    }

    #[test]
    fn non_string_reserved_values_are_treated_as_missing() {
        let record = LogRecord::from_json_object(object(json!({ "level": 3, "message": null })));
        assert_eq!(record.level(), None);
        assert_eq!(record.message(), None);
        assert!(record.fields.is_empty());
    }
}
