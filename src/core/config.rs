//! Configuration persistence - typed key/value stores backing an instance
//!
//! Two stores live inside an instance's working directory: the
//! sectioned `server.config` consumed by this engine, and the flat
//! `server.properties` consumed by the supervised process itself.
//! Reads never create the backing file; every mutation is a
//! synchronous read-modify-write against disk.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::Result;

/// A typed configuration value
///
/// `true`/`false` parse as booleans and integer literals as integers;
/// everything else stays a string. Values round-trip through the
/// persisted text format without changing type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Value {
    /// Parse a raw text token into its typed form
    pub fn parse(raw: &str) -> Self {
        match raw {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            other => match other.parse::<i64>() {
                Ok(n) => Self::Int(n),
                Err(_) => Self::Str(other.to_string()),
            },
        }
    }

    /// The integer form, if the value is an integer or an
    /// integer-looking string
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Str(s) => s.trim().parse().ok(),
            Self::Bool(_) => None,
        }
    }

    /// The string form of a non-empty value; empty strings yield None
    pub fn as_non_empty_str(&self) -> Option<String> {
        match self {
            Self::Str(s) if s.is_empty() => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(n) => write!(f, "{}", n),
            Self::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Contents of a `server.config`: section name -> key -> value
pub type ServerConfig = BTreeMap<String, BTreeMap<String, Value>>;

/// Contents of a `server.properties`: key -> value
pub type ServerProperties = BTreeMap<String, Value>;

/// Keys outside any `[section]` header land here, as in the original
/// file format
const GLOBAL_SECTION: &str = "global";

/// Well-known `server.properties` defaults, applied on read only when
/// the backing file is absent or missing the key
const DEFAULT_PORT: i64 = 25565;

fn split_pair(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    Some((key.trim(), value.trim()))
}

fn is_comment(line: &str) -> bool {
    line.starts_with('#') || line.starts_with(';')
}

/// Sectioned typed persistence for an instance's operational
/// configuration (`server.config`)
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full mapping; an absent file reads as empty and is
    /// never created here
    pub fn read(&self) -> Result<ServerConfig> {
        let mut config = ServerConfig::new();
        if !self.path.exists() {
            return Ok(config);
        }

        let text = fs::read_to_string(&self.path)?;
        let mut section = GLOBAL_SECTION.to_string();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || is_comment(line) {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = name.trim().to_string();
                continue;
            }
            if let Some((key, value)) = split_pair(line) {
                config
                    .entry(section.clone())
                    .or_default()
                    .insert(key.to_string(), Value::parse(value));
            }
        }
        Ok(config)
    }

    /// Ensure the file exists on disk, writing an empty mapping if it
    /// was absent
    pub fn materialize(&self) -> Result<()> {
        if !self.path.exists() {
            self.write(&ServerConfig::new())?;
        }
        Ok(())
    }

    /// Set `section.key = value`, creating the file and section as
    /// needed, and persist immediately
    pub fn upsert(&self, key: &str, value: Value, section: &str) -> Result<()> {
        let mut config = self.read()?;
        config
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value);
        self.write(&config)?;
        debug!("Updated {} [{}] {}", self.path.display(), section, key);
        Ok(())
    }

    fn write(&self, config: &ServerConfig) -> Result<()> {
        let mut out = fs::File::create(&self.path)?;
        for (section, entries) in config {
            writeln!(out, "[{}]", section)?;
            for (key, value) in entries {
                writeln!(out, "{} = {}", key, value)?;
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

/// Flat typed persistence for the configuration consumed by the
/// supervised process (`server.properties`)
#[derive(Debug, Clone)]
pub struct PropertiesStore {
    path: PathBuf,
}

impl PropertiesStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full mapping with well-known defaults applied for
    /// missing keys; never creates the file
    pub fn read(&self) -> Result<ServerProperties> {
        let mut properties = ServerProperties::new();
        if self.path.exists() {
            let text = fs::read_to_string(&self.path)?;
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() || is_comment(line) || line.starts_with('[') {
                    continue;
                }
                if let Some((key, value)) = split_pair(line) {
                    properties.insert(key.to_string(), Value::parse(value));
                }
            }
        }

        properties
            .entry("server-port".to_string())
            .or_insert(Value::Int(DEFAULT_PORT));
        properties
            .entry("server-ip".to_string())
            .or_insert(Value::Str(String::new()));
        Ok(properties)
    }

    /// Ensure the file exists on disk, writing an empty mapping if it
    /// was absent
    pub fn materialize(&self) -> Result<()> {
        if !self.path.exists() {
            fs::File::create(&self.path)?;
        }
        Ok(())
    }

    /// Set one key, creating the file if needed; previously-unknown
    /// keys are allowed
    pub fn upsert(&self, key: &str, value: Value) -> Result<()> {
        let mut properties = self.read()?;
        properties.insert(key.to_string(), value);
        self.write(&properties)
    }

    /// Bulk-apply a set of pairs, adding or overwriting but never
    /// removing unmentioned keys
    pub fn overlay(&self, pairs: &ServerProperties) -> Result<()> {
        let mut properties = self.read()?;
        for (key, value) in pairs {
            properties.insert(key.clone(), value.clone());
        }
        self.write(&properties)?;
        debug!("Overlaid {} properties onto {}", pairs.len(), self.path.display());
        Ok(())
    }

    fn write(&self, properties: &ServerProperties) -> Result<()> {
        let mut out = fs::File::create(&self.path)?;
        for (key, value) in properties {
            writeln!(out, "{} = {}", key, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn read_never_creates_the_file() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("server.config"));
        assert_eq!(store.read().unwrap(), ServerConfig::new());
        assert!(!store.path().exists());

        let props = PropertiesStore::new(dir.path().join("server.properties"));
        props.read().unwrap();
        assert!(!props.path().exists());
    }

    #[test]
    fn materialize_creates_the_file() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("server.config"));
        store.materialize().unwrap();
        assert!(store.path().exists());

        let props = PropertiesStore::new(dir.path().join("server.properties"));
        props.materialize().unwrap();
        assert!(props.path().exists());
    }

    #[test]
    fn upsert_creates_file_and_section() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("server.config"));
        store.upsert("java_xmx", Value::Int(256), "java").unwrap();

        assert!(store.path().exists());
        let config = store.read().unwrap();
        assert_eq!(config["java"]["java_xmx"], Value::Int(256));

        let text = std::fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("[java]"));
        assert!(text.contains("java_xmx = 256"));
    }

    #[test]
    fn values_round_trip_with_types() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("server.config"));
        store.upsert("jarfile", Value::from("mc.jar"), "java").unwrap();
        store.upsert("java_xmx", Value::Int(1024), "java").unwrap();
        store.upsert("start", Value::Bool(false), "onreboot").unwrap();

        let config = store.read().unwrap();
        assert_eq!(config["java"]["jarfile"], Value::from("mc.jar"));
        assert_eq!(config["java"]["java_xmx"], Value::Int(1024));
        assert_eq!(config["onreboot"]["start"], Value::Bool(false));
    }

    #[test]
    fn upsert_same_value_is_observationally_idempotent() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("server.config"));
        store.upsert("java_xmx", Value::Int(256), "java").unwrap();
        let before = store.read().unwrap();
        store.upsert("java_xmx", Value::Int(256), "java").unwrap();
        assert_eq!(before, store.read().unwrap());
    }

    #[test]
    fn properties_defaults_apply_when_absent() {
        let dir = tempdir().unwrap();
        let props = PropertiesStore::new(dir.path().join("server.properties"));
        let read = props.read().unwrap();
        assert_eq!(read["server-port"], Value::Int(25565));
        assert_eq!(read["server-ip"], Value::Str(String::new()));
    }

    #[test]
    fn properties_file_overrides_defaults() {
        let dir = tempdir().unwrap();
        let props = PropertiesStore::new(dir.path().join("server.properties"));
        props.upsert("server-port", Value::Int(25570)).unwrap();
        assert_eq!(props.read().unwrap()["server-port"], Value::Int(25570));
    }

    #[test]
    fn overlay_preserves_unmentioned_keys() {
        let dir = tempdir().unwrap();
        let props = PropertiesStore::new(dir.path().join("server.properties"));
        props.upsert("motd", Value::from("hello world")).unwrap();

        let mut pairs = ServerProperties::new();
        pairs.insert("server-port".to_string(), Value::Int(25565));
        pairs.insert("difficulty".to_string(), Value::Int(1));
        pairs.insert("enable-query".to_string(), Value::Bool(false));
        props.overlay(&pairs).unwrap();

        let read = props.read().unwrap();
        assert_eq!(read["server-port"], Value::Int(25565));
        assert_eq!(read["difficulty"], Value::Int(1));
        assert_eq!(read["enable-query"], Value::Bool(false));
        assert_eq!(read["motd"], Value::from("hello world"));
    }
}
