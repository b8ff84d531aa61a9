//! Model configuration written into the container metadata block.

use crate::{Result, ShardpackError};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::info;

/// A scalar configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    /// UTF-8 string.
    String(String),
    /// Signed 64-bit integer.
    Int(i64),
    /// Double-precision float.
    Float(f64),
    /// Boolean.
    Bool(bool),
}

impl ConfigValue {
    /// Convert an untyped JSON value, rejecting anything that is not a scalar
    /// the container can store.
    pub fn try_from_json(key: &str, value: &serde_json::Value) -> Result<Self> {
        use serde_json::Value;

        let unsupported = |dtype: &str| ShardpackError::UnsupportedDtype {
            name: key.to_string(),
            dtype: dtype.to_string(),
        };

        match value {
            Value::String(s) => Ok(Self::String(s.clone())),
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else if n.is_u64() {
                    Err(unsupported("integer out of i64 range"))
                } else {
                    n.as_f64()
                        .map(Self::Float)
                        .ok_or_else(|| unsupported("number"))
                }
            }
            Value::Null => Err(unsupported("null")),
            Value::Array(_) => Err(unsupported("array")),
            Value::Object(_) => Err(unsupported("object")),
        }
    }

    /// Short name of the variant, used in log output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Int(_) => "int64",
            Self::Float(_) => "float64",
            Self::Bool(_) => "bool",
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s:?}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Insertion-ordered map of configuration keys to scalar values.
///
/// Iteration order is the order keys were first inserted; the container
/// format has no canonical key order of its own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigMap {
    entries: Vec<(String, ConfigValue)>,
    index: HashMap<String, usize>,
}

impl ConfigMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in defaults for a llama-style model.
    pub fn with_defaults() -> Self {
        let mut config = Self::new();
        config.insert("model_type", "llama");
        config.insert("context_length", 4096_i64);
        config.insert("vocab_size", 32000_i64);
        config.insert("hidden_size", 4096_i64);
        config.insert("num_attention_heads", 32_i64);
        config.insert("num_hidden_layers", 32_i64);
        config
    }

    /// Defaults overlaid with the JSON object in `path`.
    pub fn from_overlay_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::with_defaults();
        config.overlay_file(path)?;
        Ok(config)
    }

    /// Insert or replace a value. Replacing keeps the key's position.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<ConfigValue>,
    ) -> Option<ConfigValue> {
        let key = key.into();
        let value = value.into();
        match self.index.get(&key) {
            Some(&idx) => Some(std::mem::replace(&mut self.entries[idx].1, value)),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Look up a value.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.index.get(key).map(|&idx| &self.entries[idx].1)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Overlay the JSON object in `path` onto this map.
    pub fn overlay_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ShardpackError::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        self.overlay_json_str(&content, path)
    }

    /// Overlay a JSON object onto this map.
    ///
    /// Existing keys take the new value in place; new keys are appended in
    /// document order. `origin` is only used for error messages.
    pub fn overlay_json_str(&mut self, json: &str, origin: impl AsRef<Path>) -> Result<()> {
        let origin = origin.as_ref();
        let parse_err = |reason: String| ShardpackError::ConfigParse {
            path: origin.to_path_buf(),
            reason,
        };

        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| parse_err(e.to_string()))?;
        let serde_json::Value::Object(object) = value else {
            return Err(parse_err("expected a JSON object at the top level".to_string()));
        };

        for (key, value) in &object {
            let value = ConfigValue::try_from_json(key, value)?;
            self.insert(key.clone(), value);
        }

        info!("Applied {} config overrides from {:?}", object.len(), origin);
        Ok(())
    }
}
