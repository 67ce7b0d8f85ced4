//! `${NAME}` / `${NAME:-fallback}` substitution inside configuration strings.

use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};
use serde_json::Value;
use tracing::debug;

/// Environment lookup used by the resolver; injectable for tests.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .expect("placeholder regex is valid")
});

/// The process environment.
pub fn process_env() -> EnvLookup {
    Arc::new(|name: &str| std::env::var(name).ok())
}

/// Replaces placeholders in every string of `value`, recursively.
///
/// Object keys are left untouched. An unset variable without a fallback
/// becomes the empty string.
pub fn substitute_env(value: Value, lookup: &dyn Fn(&str) -> Option<String>) -> Value {
    match value {
        Value::String(s) => Value::String(substitute_str(&s, lookup)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| substitute_env(v, lookup))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, substitute_env(v, lookup)))
                .collect(),
        ),
        other => other,
    }
}

fn substitute_str(s: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    if !s.contains("${") {
        return s.to_owned();
    }
    PLACEHOLDER
        .replace_all(s, |caps: &Captures<'_>| {
            let name = &caps[1];
            match (lookup(name), caps.get(2)) {
                (Some(v), _) => v,
                (None, Some(fallback)) => fallback.as_str().to_owned(),
                (None, None) => {
                    debug!(variable = name, "unset environment variable substituted with empty string");
                    String::new()
                }
            }
        })
        .into_owned()
}
