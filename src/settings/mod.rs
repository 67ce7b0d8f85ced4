//! # Worker configuration.
//!
//! - [`ConfigResolver`] finds and loads `config.json` / `config.yaml` / `config.yml`
//! - [`substitute_env`] expands `${NAME}` and `${NAME:-fallback}` placeholders
//! - [`ConfigSchema`] optional validation/coercion declared by a worker factory
//! - [`WorkerConfig`] the immutable mapping handed to the worker

mod env;
mod resolver;
mod schema;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::ConfigError;

pub use env::{EnvLookup, substitute_env};
pub use resolver::{CONFIG_FILES, ConfigResolver, Resolved};
pub use schema::ConfigSchema;

/// Immutable configuration snapshot of one worker. Cheap to clone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkerConfig {
    values: Arc<Map<String, Value>>,
}

impl WorkerConfig {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_map(values: Map<String, Value>) -> Self {
        Self {
            values: Arc::new(values),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Deserializes the whole mapping into `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        serde_json::from_value(Value::Object((*self.values).clone())).map_err(|e| {
            ConfigError::Schema {
                reason: e.to_string(),
            }
        })
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[test]
    fn typed_getters() {
        let cfg = match json!({"name": "fog", "secs": 3, "ratio": 0.5, "on": true}) {
            Value::Object(m) => WorkerConfig::from_map(m),
            _ => unreachable!(),
        };
        assert_eq!(cfg.get_str("name"), Some("fog"));
        assert_eq!(cfg.get_u64("secs"), Some(3));
        assert_eq!(cfg.get_f64("ratio"), Some(0.5));
        assert_eq!(cfg.get_bool("on"), Some(true));
        assert_eq!(cfg.get_u64("name"), None);

        #[derive(Deserialize)]
        struct Fog {
            secs: u64,
        }
        assert_eq!(cfg.deserialize::<Fog>().unwrap().secs, 3);
    }

    #[test]
    fn empty_is_empty() {
        assert!(WorkerConfig::empty().is_empty());
        assert!(WorkerConfig::empty().get("x").is_none());
    }
}
