//! # Declared configuration schemas.
//!
//! A worker factory may declare a [`ConfigSchema`]. The resolver applies it
//! after env substitution: the mapping is validated and coerced, defaults are
//! filled in, and the result replaces the raw mapping.
//!
//! ## Example
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use serde_json::{Map, json};
//! use propvisor::ConfigSchema;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Fog {
//!     #[serde(default = "five")]
//!     burst_secs: u64,
//! }
//! fn five() -> u64 { 5 }
//!
//! let schema = ConfigSchema::typed::<Fog>();
//! let out = schema.apply(Map::new()).unwrap();
//! assert_eq!(out.get("burst_secs"), Some(&json!(5)));
//! ```

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::ConfigError;

type ApplyFn = dyn Fn(Map<String, Value>) -> Result<Map<String, Value>, String> + Send + Sync;

/// Validation/coercion step for a worker configuration mapping.
#[derive(Clone)]
pub struct ConfigSchema {
    name: &'static str,
    apply: Arc<ApplyFn>,
}

impl ConfigSchema {
    /// Schema backed by a serde type: the mapping is deserialized into `T` and
    /// serialized back. Unknown keys are dropped unless `T` denies them.
    pub fn typed<T>() -> Self
    where
        T: DeserializeOwned + Serialize + 'static,
    {
        Self {
            name: std::any::type_name::<T>(),
            apply: Arc::new(|map| {
                let typed: T =
                    serde_json::from_value(Value::Object(map)).map_err(|e| e.to_string())?;
                match serde_json::to_value(typed).map_err(|e| e.to_string())? {
                    Value::Object(out) => Ok(out),
                    other => Err(format!("schema produced a non-mapping value: {other}")),
                }
            }),
        }
    }

    /// Schema backed by a closure.
    pub fn from_fn<F>(name: &'static str, f: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Result<Map<String, Value>, String> + Send + Sync + 'static,
    {
        Self {
            name,
            apply: Arc::new(f),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Validates and coerces `map`.
    pub fn apply(&self, map: Map<String, Value>) -> Result<Map<String, Value>, ConfigError> {
        (self.apply)(map).map_err(|reason| ConfigError::Schema { reason })
    }
}

impl fmt::Debug for ConfigSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigSchema")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
