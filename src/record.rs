//! The mutable measurement document a test assembles while it runs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Date format used inside measurement records.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Version of the record layout written by this engine.
pub const DATA_FORMAT_VERSION: &str = "0.2.0";

/// A structured key/value document describing one measurement.
///
/// The test that owns the record is the only writer while it runs; probe
/// findings live under the `test_keys` sub-object, identity fields at the
/// top level.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Record::default()
    }

    /// Set a top-level field.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Set a field inside the `test_keys` sub-object, creating it on first
    /// use.
    pub fn set_test_key(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let keys = self
            .fields
            .entry("test_keys")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = keys {
            map.insert(key.into(), value.into());
        }
        self
    }

    pub fn test_key(&self, key: &str) -> Option<&Value> {
        self.fields.get("test_keys")?.as_object()?.get(key)
    }

    /// Merge the standard identity fields into the record.
    ///
    /// Idempotent: the first call wins, later calls leave the record
    /// untouched, so identity is merged exactly once no matter how many
    /// layers sit between the test and the reporter.
    pub fn fill_identity(&mut self, name: &str, version: &str, test_start_time: DateTime<Utc>) {
        if self.fields.contains_key("test_name") {
            return;
        }
        self.set("id", Uuid::new_v4().to_string())
            .set("test_name", name)
            .set("test_version", version)
            .set(
                "test_start_time",
                test_start_time.format(DATE_FORMAT).to_string(),
            )
            .set("software_name", env!("CARGO_PKG_NAME"))
            .set("software_version", env!("CARGO_PKG_VERSION"))
            .set("data_format_version", DATA_FORMAT_VERSION);
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_filled_exactly_once() {
        let mut record = Record::new();
        let t0 = Utc::now();
        record.fill_identity("tcp_connect", "0.0.1", t0);
        let first_id = record.get("id").cloned();

        record.fill_identity("other_test", "9.9.9", t0);
        assert_eq!(record.get("test_name").unwrap(), "tcp_connect");
        assert_eq!(record.get("test_version").unwrap(), "0.0.1");
        assert_eq!(record.get("id").cloned(), first_id);
        assert_eq!(
            record.get("data_format_version").unwrap(),
            DATA_FORMAT_VERSION
        );
    }

    #[test]
    fn test_keys_are_nested() {
        let mut record = Record::new();
        record.set_test_key("connection", "success");
        record.set_test_key("failure", Value::Null);
        assert_eq!(record.test_key("connection").unwrap(), "success");
        assert!(record.test_key("failure").unwrap().is_null());
        assert!(record.get("connection").is_none());
    }
}
