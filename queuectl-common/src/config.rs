//! Configuration management.
//!
//! Settings live in a small JSON document next to the queue database.
//! Unknown keys are preserved verbatim; the recognized keys accept both
//! their hyphenated and underscored spellings on input and are stored
//! underscored.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "queuectl_config.json";

pub const DEFAULT_MAX_RETRIES: i32 = 3;
pub const DEFAULT_BACKOFF_BASE: u32 = 2;
pub const DEFAULT_DB_PATH: &str = "queuectl.db";

/// (key, minimum) pairs for the integer settings.
const INTEGER_KEYS: [(&str, i64); 2] = [("max_retries", 1), ("backoff_base", 2)];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("'{key}' must be an integer")]
    InvalidInteger { key: String },
    #[error("'{key}' must be at least {min}")]
    OutOfRange { key: String, min: i64 },
    #[error("failed to write {path}: {error}")]
    WriteError {
        path: PathBuf,
        error: std::io::Error,
    },
}

/// The queuectl configuration, loaded once per invocation.
#[derive(Debug, Clone)]
pub struct Config {
    path: PathBuf,
    values: Map<String, Value>,
}

impl Config {
    /// Load the configuration at `path`. A missing or malformed file is
    /// not an error: the defaults apply and the file is left untouched.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut values = Self::defaults();

        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Map<String, Value>>(&contents) {
                Ok(stored) => {
                    for (key, value) in stored {
                        values.insert(canonical_key(&key), value);
                    }
                }
                Err(error) => {
                    warn!(path = %path.display(), %error, "malformed config file, using defaults");
                }
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => {
                warn!(path = %path.display(), %error, "unreadable config file, using defaults");
            }
        }

        Self { path, values }
    }

    pub fn load_default() -> Self {
        Self::load(DEFAULT_CONFIG_PATH)
    }

    fn defaults() -> Map<String, Value> {
        let mut values = Map::new();
        values.insert("max_retries".to_owned(), DEFAULT_MAX_RETRIES.into());
        values.insert("backoff_base".to_owned(), DEFAULT_BACKOFF_BASE.into());
        values.insert("db_path".to_owned(), DEFAULT_DB_PATH.into());
        values
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Default attempt ceiling for submissions that omit `max_retries`.
    pub fn max_retries(&self) -> i32 {
        self.integer("max_retries", i64::from(DEFAULT_MAX_RETRIES)) as i32
    }

    /// Base of the exponential retry delay.
    pub fn backoff_base(&self) -> u32 {
        self.integer("backoff_base", i64::from(DEFAULT_BACKOFF_BASE)) as u32
    }

    /// Path to the persistent store.
    pub fn db_path(&self) -> String {
        match self.values.get("db_path").and_then(Value::as_str) {
            Some(path) => path.to_owned(),
            None => {
                warn!("db_path is not a string, using the default");
                DEFAULT_DB_PATH.to_owned()
            }
        }
    }

    fn integer(&self, key: &str, default: i64) -> i64 {
        let min = INTEGER_KEYS
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, min)| *min)
            .unwrap_or(i64::MIN);
        match self.values.get(key).and_then(Value::as_i64) {
            Some(value) if value >= min => value,
            Some(value) => {
                warn!(key, value, "config value out of range, using the default");
                default
            }
            None => default,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(&canonical_key(key))
    }

    /// Every stored entry, recognized and unknown keys alike.
    pub fn entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Set a value, canonicalising the key and coercing integers for the
    /// recognized numeric settings, then persist the document.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let key = canonical_key(key);

        let value = match INTEGER_KEYS.iter().find(|(k, _)| *k == key) {
            Some((_, min)) => {
                let parsed: i64 = value.parse().map_err(|_| ConfigError::InvalidInteger {
                    key: key.clone(),
                })?;
                if parsed < *min {
                    return Err(ConfigError::OutOfRange {
                        key,
                        min: *min,
                    });
                }
                Value::from(parsed)
            }
            None => Value::from(value),
        };

        self.values.insert(key, value);
        self.save()
    }

    /// Restore the defaults and persist them, dropping unknown keys.
    pub fn reset(&mut self) -> Result<(), ConfigError> {
        self.values = Self::defaults();
        self.save()
    }

    fn save(&self) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(&self.values)
            .expect("config map serializes to JSON");
        fs::write(&self.path, contents).map_err(|error| ConfigError::WriteError {
            path: self.path.clone(),
            error,
        })
    }
}

/// Map hyphenated spellings of the recognized keys to their stored form.
fn canonical_key(key: &str) -> String {
    match key {
        "max-retries" => "max_retries".to_owned(),
        "backoff-base" => "backoff_base".to_owned(),
        "db-path" => "db_path".to_owned(),
        other => other.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_config() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let config = Config::load(dir.path().join("config.json"));
        (dir, config)
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let (_dir, config) = scratch_config();
        assert_eq!(config.max_retries(), 3);
        assert_eq!(config.backoff_base(), 2);
        assert_eq!(config.db_path(), "queuectl.db");
    }

    #[test]
    fn test_set_and_reload() {
        let (dir, mut config) = scratch_config();
        config.set("max_retries", "5").unwrap();
        config.set("db_path", "other.db").unwrap();

        let reloaded = Config::load(dir.path().join("config.json"));
        assert_eq!(reloaded.max_retries(), 5);
        assert_eq!(reloaded.db_path(), "other.db");
        // Keys not touched keep their defaults.
        assert_eq!(reloaded.backoff_base(), 2);
    }

    #[test]
    fn test_hyphenated_keys_are_canonicalised() {
        let (dir, mut config) = scratch_config();
        config.set("max-retries", "4").unwrap();
        assert_eq!(config.max_retries(), 4);

        let raw = fs::read_to_string(dir.path().join("config.json")).unwrap();
        let stored: Map<String, Value> = serde_json::from_str(&raw).unwrap();
        assert!(stored.contains_key("max_retries"));
        assert!(!stored.contains_key("max-retries"));
    }

    #[test]
    fn test_integer_settings_are_validated() {
        let (_dir, mut config) = scratch_config();
        assert!(matches!(
            config.set("max_retries", "lots"),
            Err(ConfigError::InvalidInteger { .. })
        ));
        assert!(matches!(
            config.set("max_retries", "0"),
            Err(ConfigError::OutOfRange { min: 1, .. })
        ));
        assert!(matches!(
            config.set("backoff_base", "1"),
            Err(ConfigError::OutOfRange { min: 2, .. })
        ));
        assert_eq!(config.max_retries(), 3);
    }

    #[test]
    fn test_unknown_keys_are_preserved() {
        let (dir, mut config) = scratch_config();
        config.set("notify_email", "ops@example.com").unwrap();

        let reloaded = Config::load(dir.path().join("config.json"));
        assert_eq!(
            reloaded.get("notify_email").and_then(Value::as_str),
            Some("ops@example.com")
        );
        assert!(reloaded.entries().any(|(k, _)| k == "notify_email"));
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults_and_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let config = Config::load(&path);
        assert_eq!(config.max_retries(), 3);
        // The broken file is left as-is for the operator to inspect.
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_out_of_range_stored_value_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"backoff_base": 1, "max_retries": "three"}"#).unwrap();

        let config = Config::load(&path);
        assert_eq!(config.backoff_base(), 2);
        assert_eq!(config.max_retries(), 3);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let (dir, mut config) = scratch_config();
        config.set("max_retries", "9").unwrap();
        config.set("custom", "kept-until-reset").unwrap();
        config.reset().unwrap();

        let reloaded = Config::load(dir.path().join("config.json"));
        assert_eq!(reloaded.max_retries(), 3);
        assert!(reloaded.get("custom").is_none());
    }
}
