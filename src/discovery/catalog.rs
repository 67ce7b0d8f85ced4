//! Compiled-in worker implementations, keyed by kind.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::worker::WorkerFactory;

/// Kind → factory map consulted by the loader.
#[derive(Clone, Default)]
pub struct WorkerCatalog {
    factories: BTreeMap<String, Arc<dyn WorkerFactory>>,
}

impl WorkerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog pre-populated with the workers shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        crate::builtin::register(&mut catalog);
        catalog
    }

    /// Registers `factory` under its kind; returns the factory it replaced.
    pub fn register(&mut self, factory: Arc<dyn WorkerFactory>) -> Option<Arc<dyn WorkerFactory>> {
        self.factories.insert(factory.kind().to_owned(), factory)
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn WorkerFactory>> {
        self.factories.get(kind).cloned()
    }

    /// Registered kinds in sorted order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for WorkerCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.kinds()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_include_heartbeat() {
        let catalog = WorkerCatalog::with_builtins();
        assert!(catalog.get("heartbeat").is_some());
        assert!(catalog.get("nope").is_none());
        assert!(catalog.kinds().any(|k| k == "heartbeat"));
    }
}
