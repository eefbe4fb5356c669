//! Typed string configuration entries.
//!
//! A [`SettingsEntry`] is a canonical string that can also be read back as a
//! typed value. The string is the single source of truth: there is no hidden
//! typed field that could drift from it, so the typed view and the string
//! view can never disagree.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, ValueError};

/// One configuration value, stored in its canonical string form.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsEntry(String);

impl SettingsEntry {
    /// Build an entry from any displayable value.
    pub fn new(value: impl fmt::Display) -> Self {
        SettingsEntry(value.to_string())
    }

    /// Parse the canonical string as `T`.
    ///
    /// The parse must succeed and consume the whole string (`FromStr` for the
    /// primitive types rejects trailing garbage), otherwise a [`ValueError`]
    /// naming the offending input is returned.
    pub fn get<T: FromStr>(&self) -> Result<T, ValueError> {
        self.0.parse().map_err(|_| ValueError {
            input: self.0.clone(),
            wanted: std::any::type_name::<T>(),
        })
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SettingsEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SettingsEntry {
    fn from(s: &str) -> Self {
        SettingsEntry(s.to_owned())
    }
}

impl From<String> for SettingsEntry {
    fn from(s: String) -> Self {
        SettingsEntry(s)
    }
}

/// String-keyed configuration bundle for tests and connections.
///
/// `Clone` gives copy-on-pass semantics: a holder mutating its copy is never
/// observed by another holder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings {
    map: BTreeMap<String, SettingsEntry>,
}

impl Settings {
    pub fn new() -> Self {
        Settings::default()
    }

    /// Insert or replace a value, converting it to canonical string form.
    pub fn set(&mut self, key: impl Into<String>, value: impl fmt::Display) -> &mut Self {
        self.map.insert(key.into(), SettingsEntry::new(value));
        self
    }

    /// Raw entry lookup.
    pub fn entry(&self, key: &str) -> Option<&SettingsEntry> {
        self.map.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Typed lookup of a required setting.
    pub fn get<T: FromStr>(&self, key: &str) -> Result<T, ConfigError> {
        let entry = self
            .map
            .get(key)
            .ok_or_else(|| ConfigError::Missing(key.to_owned()))?;
        entry.get().map_err(|source| ConfigError::Invalid {
            key: key.to_owned(),
            source,
        })
    }

    /// Typed lookup falling back to `default` when the key is absent.
    ///
    /// A present-but-malformed value is still an error: a typo should not
    /// silently select the default.
    pub fn get_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.map.get(key) {
            None => Ok(default),
            Some(entry) => entry.get().map_err(|source| ConfigError::Invalid {
                key: key.to_owned(),
                source,
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingsEntry)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<K: Into<String>, V: Into<SettingsEntry>> FromIterator<(K, V)> for Settings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Settings {
            map: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_integers_bools_and_strings() {
        assert_eq!(SettingsEntry::new(42u16).get::<u16>().unwrap(), 42);
        assert_eq!(SettingsEntry::new(-7i64).get::<i64>().unwrap(), -7);
        assert_eq!(SettingsEntry::new(true).get::<bool>().unwrap(), true);
        assert_eq!(SettingsEntry::new(0.5f64).get::<f64>().unwrap(), 0.5);
        assert_eq!(
            SettingsEntry::new("example.org").get::<String>().unwrap(),
            "example.org"
        );
    }

    #[test]
    fn typed_view_is_derived_from_the_string_view() {
        let entry = SettingsEntry::new(8080u16);
        assert_eq!(entry.as_str(), "8080");
        assert_eq!(entry.to_string(), "8080");
        assert_eq!(entry.get::<u32>().unwrap(), 8080);
    }

    #[test]
    fn incompatible_extraction_is_a_value_error() {
        let entry = SettingsEntry::new("abc");
        let err = entry.get::<i64>().unwrap_err();
        assert_eq!(err.input, "abc");
    }

    #[test]
    fn partial_parse_is_rejected() {
        // trailing garbage must not be silently dropped
        assert!(SettingsEntry::new("80x").get::<u16>().is_err());
        assert!(SettingsEntry::new("1.5 ").get::<f64>().is_err());
    }

    #[test]
    fn settings_copy_on_pass() {
        let mut a = Settings::new();
        a.set("port", 80);
        let b = a.clone();
        a.set("port", 443);
        assert_eq!(b.get::<u16>("port").unwrap(), 80);
        assert_eq!(a.get::<u16>("port").unwrap(), 443);
    }

    #[test]
    fn missing_and_invalid_are_distinct() {
        let settings: Settings = [("port", "not-a-number")].into_iter().collect();
        assert!(matches!(
            settings.get::<u16>("host"),
            Err(ConfigError::Missing(_))
        ));
        assert!(matches!(
            settings.get::<u16>("port"),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn get_or_defaults_only_when_absent() {
        let settings: Settings = [("net/timeout", "bogus")].into_iter().collect();
        assert_eq!(Settings::new().get_or("net/timeout", 30.0).unwrap(), 30.0);
        assert!(settings.get_or("net/timeout", 30.0).is_err());
    }
}
