//! # Per-worker configuration resolution.
//!
//! ```text
//! dir/config.json ─┐
//! dir/config.yaml ─┼─ first existing ──► parse ──► mapping? ──► ${ENV} ──► schema ──► WorkerConfig
//! dir/config.yml ──┘       │                 (any failure: empty config + one ConfigError)
//!                          └── none: empty mapping (schema still fills defaults)
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::env::{EnvLookup, process_env, substitute_env};
use super::{ConfigSchema, WorkerConfig};
use crate::error::ConfigError;

/// Candidate file names in precedence order.
pub const CONFIG_FILES: [&str; 3] = ["config.json", "config.yaml", "config.yml"];

/// Outcome of resolving one worker directory.
#[derive(Debug)]
pub struct Resolved {
    /// The configuration to hand to the worker (empty on failure).
    pub config: WorkerConfig,
    /// The file that was used, if any.
    pub source: Option<PathBuf>,
    /// Set when the configuration was rejected and replaced by an empty one.
    pub warning: Option<ConfigError>,
}

/// Loads, substitutes and validates worker configuration files.
#[derive(Clone)]
pub struct ConfigResolver {
    env: EnvLookup,
}

impl ConfigResolver {
    /// Resolver reading the process environment.
    pub fn new() -> Self {
        Self { env: process_env() }
    }

    /// Resolver with an explicit environment lookup.
    pub fn with_env<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            env: std::sync::Arc::new(lookup),
        }
    }

    /// Returns the configuration file that applies to `dir`, if any.
    pub fn locate(&self, dir: &Path) -> Option<PathBuf> {
        CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|p| p.is_file())
    }

    /// Resolves the configuration for `dir`. Never fails: problems end up in
    /// [`Resolved::warning`] with an empty configuration.
    pub fn resolve(&self, dir: &Path, schema: Option<&ConfigSchema>) -> Resolved {
        let source = self.locate(dir);
        match self.load(source.as_deref(), schema) {
            Ok(map) => Resolved {
                config: WorkerConfig::from_map(map),
                source,
                warning: None,
            },
            Err(err) => Resolved {
                config: WorkerConfig::empty(),
                source,
                warning: Some(err),
            },
        }
    }

    fn load(
        &self,
        path: Option<&Path>,
        schema: Option<&ConfigSchema>,
    ) -> Result<Map<String, Value>, ConfigError> {
        let raw = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                parse(path, &text)?
            }
            None => Map::new(),
        };

        let substituted = match substitute_env(Value::Object(raw), &*self.env) {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        match schema {
            Some(schema) => schema.apply(substituted),
            None => Ok(substituted),
        }
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConfigResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigResolver").finish_non_exhaustive()
    }
}

fn parse(path: &Path, text: &str) -> Result<Map<String, Value>, ConfigError> {
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == "yaml" || e == "yml");

    let value = if is_yaml {
        if text.trim().is_empty() {
            return Ok(Map::new());
        }
        let yaml: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                format: "yaml",
                reason: e.to_string(),
            })?;
        if yaml.is_null() {
            return Ok(Map::new());
        }
        serde_json::to_value(yaml).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            format: "yaml",
            reason: e.to_string(),
        })?
    } else {
        serde_json::from_str::<Value>(text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            format: "json",
            reason: e.to_string(),
        })?
    };

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ConfigError::NotAMapping {
            path: path.to_path_buf(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::*;

    fn resolver() -> ConfigResolver {
        ConfigResolver::with_env(|name| (name == "HUE_HOST").then(|| "10.1.1.2".to_owned()))
    }

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn json_wins_over_yaml() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "config.yaml", "source: yaml\n");
        write(dir.path(), "config.json", r#"{"source": "json"}"#);
        let r = resolver().resolve(dir.path(), None);
        assert_eq!(r.config.get_str("source"), Some("json"));
        assert_eq!(r.source, Some(dir.path().join("config.json")));
        assert!(r.warning.is_none());
    }

    #[test]
    fn yaml_before_yml() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "config.yml", "source: yml\n");
        write(dir.path(), "config.yaml", "source: yaml\n");
        assert_eq!(
            resolver().resolve(dir.path(), None).config.get_str("source"),
            Some("yaml")
        );
    }

    #[test]
    fn missing_file_gives_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver().resolve(dir.path(), None);
        assert!(r.config.is_empty());
        assert!(r.source.is_none());
        assert!(r.warning.is_none());
    }

    #[test]
    fn empty_yaml_document_is_an_empty_mapping() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "config.yaml", "# nothing here\n");
        let r = resolver().resolve(dir.path(), None);
        assert!(r.config.is_empty());
        assert!(r.warning.is_none());
    }

    #[test]
    fn invalid_syntax_is_a_warning_with_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "config.json", "{ not json");
        let r = resolver().resolve(dir.path(), None);
        assert!(r.config.is_empty());
        assert!(matches!(r.warning, Some(ConfigError::Parse { format: "json", .. })));
    }

    #[test]
    fn non_mapping_top_level_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "config.yaml", "- a\n- b\n");
        let r = resolver().resolve(dir.path(), None);
        assert!(matches!(r.warning, Some(ConfigError::NotAMapping { .. })));
    }

    #[test]
    fn env_substitution_happens_before_schema() {
        #[derive(Serialize, Deserialize)]
        struct Hue {
            host: String,
            #[serde(default)]
            port: u16,
        }

        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "config.yaml",
            "host: ${HUE_HOST}\nuser: ${HUE_USER:-guest}\n",
        );
        let schema = ConfigSchema::typed::<Hue>();
        let r = resolver().resolve(dir.path(), Some(&schema));
        assert!(r.warning.is_none());
        assert_eq!(
            r.config.get("host"),
            Some(&json!("10.1.1.2")),
        );
        assert_eq!(r.config.get_u64("port"), Some(0));
        assert!(r.config.get("user").is_none());
    }

    #[test]
    fn schema_failure_is_a_warning() {
        #[derive(Serialize, Deserialize)]
        struct Strict {
            required: String,
        }

        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "config.json", r#"{"other": 1}"#);
        let r = resolver().resolve(dir.path(), Some(&ConfigSchema::typed::<Strict>()));
        assert!(r.config.is_empty());
        assert!(matches!(r.warning, Some(ConfigError::Schema { .. })));
    }
}
