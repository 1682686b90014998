//! Persisted section/option settings backed by a TOML document.
//!
//! ```toml
//! [SERVER]
//! host = "192.168.1.10"
//! port = 25000
//! ```
//!
//! Values written by the server arrive as JSON and are frequently strings, so
//! every typed getter also accepts a string spelling of its type.

use super::RuntimeConfig;
use crate::error::{ClientError, Result};
use crate::protocol::parse_bool;
use std::fs;
use std::path::{Path, PathBuf};
use toml::{Table, Value};
use tracing::{debug, info};

/// Section/option key-value store with whole-file persistence.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    document: Table,
}

impl ConfigStore {
    /// Open an existing configuration file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let document = read_document(&path)?;
        Ok(Self { path, document })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw value of `section.option`, if present.
    pub fn get(&self, section: &str, option: &str) -> Option<&Value> {
        self.document.get(section)?.as_table()?.get(option)
    }

    pub fn get_str(&self, section: &str, option: &str) -> Result<String> {
        match self.require(section, option)? {
            Value::String(s) => Ok(s.clone()),
            Value::Integer(i) => Ok(i.to_string()),
            Value::Float(f) => Ok(f.to_string()),
            Value::Boolean(b) => Ok(b.to_string()),
            other => Err(invalid(section, option, "string", other)),
        }
    }

    pub fn get_int(&self, section: &str, option: &str) -> Result<i64> {
        match self.require(section, option)? {
            Value::Integer(i) => Ok(*i),
            Value::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|_| invalid(section, option, "integer", &Value::String(s.clone()))),
            other => Err(invalid(section, option, "integer", other)),
        }
    }

    pub fn get_float(&self, section: &str, option: &str) -> Result<f64> {
        match self.require(section, option)? {
            Value::Float(f) => Ok(*f),
            Value::Integer(i) => Ok(*i as f64),
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|_| invalid(section, option, "float", &Value::String(s.clone()))),
            other => Err(invalid(section, option, "float", other)),
        }
    }

    pub fn get_bool(&self, section: &str, option: &str) -> Result<bool> {
        match self.require(section, option)? {
            Value::Boolean(b) => Ok(*b),
            Value::Integer(i) => Ok(*i != 0),
            Value::String(s) => {
                parse_bool(s).ok_or_else(|| invalid(section, option, "boolean", &Value::String(s.clone())))
            }
            other => Err(invalid(section, option, "boolean", other)),
        }
    }

    /// Like [`get_str`](Self::get_str) but falls back to `default` when absent.
    pub fn get_str_or(&self, section: &str, option: &str, default: &str) -> Result<String> {
        if self.get(section, option).is_some() {
            self.get_str(section, option)
        } else {
            Ok(default.to_string())
        }
    }

    pub fn get_int_or(&self, section: &str, option: &str, default: i64) -> Result<i64> {
        if self.get(section, option).is_some() {
            self.get_int(section, option)
        } else {
            Ok(default)
        }
    }

    pub fn get_float_or(&self, section: &str, option: &str, default: f64) -> Result<f64> {
        if self.get(section, option).is_some() {
            self.get_float(section, option)
        } else {
            Ok(default)
        }
    }

    pub fn get_bool_or(&self, section: &str, option: &str, default: bool) -> Result<bool> {
        if self.get(section, option).is_some() {
            self.get_bool(section, option)
        } else {
            Ok(default)
        }
    }

    /// Set `section.option` and rewrite the whole file.
    ///
    /// The file is re-read first so edits made on disk since the last load
    /// survive. Assumes a single writer.
    pub fn set(&mut self, section: &str, option: &str, value: impl Into<Value>) -> Result<()> {
        if let Ok(document) = read_document(&self.path) {
            self.document = document;
        }
        let value = value.into();
        debug!("Config set {}.{} = {}", section, option, value);

        let table = self
            .document
            .entry(section.to_string())
            .or_insert(Value::Table(Table::new()));
        let Value::Table(table) = table else {
            return Err(ClientError::Config(format!(
                "{} is not a section",
                section
            )));
        };
        table.insert(option.to_string(), value);
        self.persist()
    }

    /// Set from a JSON value received over the wire.
    pub fn set_json(&mut self, section: &str, option: &str, value: &serde_json::Value) -> Result<()> {
        self.set(section, option, json_to_toml(value))
    }

    /// Re-read the file and derive a fresh runtime snapshot.
    pub fn reload(&mut self) -> Result<RuntimeConfig> {
        self.document = read_document(&self.path)?;
        let config = RuntimeConfig::from_store(self)?;
        info!(
            "Configuration loaded from {:?} (node id {})",
            self.path, config.identity.id
        );
        Ok(config)
    }

    fn require(&self, section: &str, option: &str) -> Result<&Value> {
        self.get(section, option)
            .ok_or_else(|| ClientError::Config(format!("missing option {}.{}", section, option)))
    }

    /// Write to a sibling temp file, then rename over the original.
    fn persist(&self) -> Result<()> {
        let contents = toml::to_string(&self.document)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, contents)
            .map_err(|e| ClientError::Config(format!("failed to write {:?}: {}", tmp, e)))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| ClientError::Config(format!("failed to replace {:?}: {}", self.path, e)))?;
        Ok(())
    }
}

fn read_document(path: &Path) -> Result<Table> {
    let content = fs::read_to_string(path)
        .map_err(|e| ClientError::Config(format!("failed to read {:?}: {}", path, e)))?;
    Ok(content.parse::<Table>()?)
}

fn invalid(section: &str, option: &str, expected: &str, got: &Value) -> ClientError {
    ClientError::Config(format!(
        "{}.{}: expected {}, got {}",
        section, option, expected, got
    ))
}

fn json_to_toml(value: &serde_json::Value) -> Value {
    use serde_json::Value as Json;
    match value {
        Json::Null => Value::String(String::new()),
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Float(n.as_f64().unwrap_or_default()),
        },
        Json::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}
