//! # Cross-worker shared state.
//!
//! A process-wide key/value store injected into every worker at construction.
//! Keys are namespaced by the owning worker id and only that worker holds a
//! [`StateWriter`] for them, so every key has exactly one writer. Any worker
//! may read any key.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{Map, Value};

type Store = BTreeMap<(Arc<str>, String), Value>;

/// Shared, read-mostly key/value store.
#[derive(Clone, Default)]
pub struct SharedState {
    inner: Arc<RwLock<Store>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer for the keys owned by `owner`.
    pub(crate) fn writer(&self, owner: &str) -> StateWriter {
        StateWriter {
            owner: Arc::from(owner),
            state: self.clone(),
        }
    }

    /// Reads `owner`'s `key`.
    pub fn get(&self, owner: &str, key: &str) -> Option<Value> {
        let store = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        store.get(&(Arc::from(owner), key.to_owned())).cloned()
    }

    /// Every key owned by `owner`.
    pub fn snapshot(&self, owner: &str) -> Map<String, Value> {
        let store = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        store
            .iter()
            .filter(|((o, _), _)| &**o == owner)
            .map(|((_, k), v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl fmt::Debug for SharedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("SharedState").field("keys", &len).finish()
    }
}

/// Write access to one worker's keys.
#[derive(Clone, Debug)]
pub struct StateWriter {
    owner: Arc<str>,
    state: SharedState,
}

impl StateWriter {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let mut store = self
            .state
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        store.insert((Arc::clone(&self.owner), key.to_owned()), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut store = self
            .state
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        store.remove(&(Arc::clone(&self.owner), key.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn writes_are_namespaced_by_owner() {
        let shared = SharedState::new();
        let a = shared.writer("a");
        let b = shared.writer("b");
        a.set("mode", "armed");
        b.set("mode", "idle");

        assert_eq!(shared.get("a", "mode"), Some(json!("armed")));
        assert_eq!(shared.get("b", "mode"), Some(json!("idle")));
        assert_eq!(shared.snapshot("a").len(), 1);
        assert_eq!(a.remove("mode"), Some(json!("armed")));
        assert!(shared.get("a", "mode").is_none());
    }
}
