//! Key-value settings storage.
//!
//! Values are JSON. Every store is last-writer-wins; nothing here is
//! transactional.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::EngineError;

pub trait SettingsStore {
    fn get(&self, key: &str) -> Result<Option<Value>, EngineError>;
    fn set(&mut self, key: &str, value: Value) -> Result<(), EngineError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    map: Map<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.map.insert(key.to_string(), value);
        self
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, EngineError> {
        Ok(self.map.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), EngineError> {
        self.map.insert(key.to_string(), value);
        Ok(())
    }
}

/// One JSON object per file, re-read on every access so separate processes
/// (or threads) sharing the file see each other's writes.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>, EngineError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        match load_json_result::<Value>(&self.path)? {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(Map::new()),
            _ => Err(EngineError::InvalidSettings {
                key: self.path.display().to_string(),
                msg: "top-level value must be an object".into(),
            }),
        }
    }
}

impl SettingsStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, EngineError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), EngineError> {
        let mut all = self.read_all()?;
        all.insert(key.to_string(), value);

        let text = serde_json::to_string_pretty(&Value::Object(all)).map_err(|e| EngineError::Json {
            path: self.path.clone(),
            source: e,
        })?;
        std::fs::write(&self.path, text).map_err(|e| EngineError::Io {
            path: self.path.clone(),
            source: e,
        })
    }
}

/// Locate the settings file.
///
/// Resolution order:
/// 1) explicit path (CLI flag)
/// 2) `VIDEOFILTERS_SETTINGS` env var (if set)
/// 3) `videofilters.settings.json` in `fallback_dir`
pub fn resolve_settings_path(explicit: Option<PathBuf>, fallback_dir: &Path) -> PathBuf {
    if let Some(p) = explicit {
        return p;
    }
    if let Ok(p) = std::env::var("VIDEOFILTERS_SETTINGS") {
        if !p.trim().is_empty() {
            return PathBuf::from(p);
        }
    }
    fallback_dir.join("videofilters.settings.json")
}

/// Read a UTF-8 file into a String (Result-based).
pub fn read_to_string_result(path: &Path) -> Result<String, EngineError> {
    std::fs::read_to_string(path).map_err(|e| EngineError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Deserialize JSON from a file (Result-based).
pub fn load_json_result<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, EngineError> {
    let s = read_to_string_result(path)?;
    serde_json::from_str(&s).map_err(|e| EngineError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}
