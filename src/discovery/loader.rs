//! # Scans discovery roots for worker manifests.
//!
//! ```text
//! DiscoveryRoot (Builtin)  <root>/<name>/worker.json           id = <name>
//! DiscoveryRoot (Props)    <root>/<prop>/backend/worker.json   id = <prop>
//!        │ sorted entries, roots in insertion order
//!        ▼
//! Manifest::read ─► WorkerId::parse ─► WorkerCatalog::get(kind) ─► duplicate check
//!        │ any failure: one DiscoveryError + DiscoveryFailed, candidate skipped
//!        ▼
//! WorkerDescriptor ─► LoadReport::descriptors
//! ```
//!
//! Directories without a manifest are not candidates and are skipped silently.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use super::catalog::WorkerCatalog;
use super::manifest::{MANIFEST_FILE_NAME, Manifest};
use crate::error::{ConfigError, DiscoveryError};
use crate::events::{Bus, Event, EventKind};
use crate::worker::{WorkerFactory, WorkerId};

/// How candidates are laid out below a root.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// `<root>/<name>/worker.json`
    Builtin,
    /// `<root>/<prop>/backend/worker.json`
    Props,
}

/// A directory scanned for worker candidates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveryRoot {
    pub path: PathBuf,
    pub layout: Layout,
}

impl DiscoveryRoot {
    pub fn builtin(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            layout: Layout::Builtin,
        }
    }

    pub fn props(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            layout: Layout::Props,
        }
    }

    /// Directory holding the manifest and config for the entry `folder`.
    fn entry_dir(&self, folder: &Path) -> PathBuf {
        match self.layout {
            Layout::Builtin => folder.to_path_buf(),
            Layout::Props => folder.join("backend"),
        }
    }
}

/// An accepted candidate. Immutable once discovered.
#[derive(Clone)]
pub struct WorkerDescriptor {
    pub id: WorkerId,
    /// Manifest path.
    pub origin: PathBuf,
    /// Directory the config file is looked up in.
    pub dir: PathBuf,
    pub kind: String,
    pub factory: Arc<dyn WorkerFactory>,
    pub enabled: bool,
}

impl fmt::Debug for WorkerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerDescriptor")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .field("kind", &self.kind)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Outcome of discovery and registration.
///
/// Discovery fills `descriptors` and `failures`; the registry adds the
/// filtering decisions, config warnings and the registered ids.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub descriptors: Vec<WorkerDescriptor>,
    pub failures: Vec<DiscoveryError>,
    /// `(id, reason)` for descriptors excluded by filtering or `enabled: false`.
    pub filtered: Vec<(String, String)>,
    /// Workers running with an empty config, and why.
    pub config_warnings: Vec<(String, ConfigError)>,
    /// Ids of instances created, in registration order.
    pub registered: Vec<String>,
}

impl LoadReport {
    pub fn discovered_ids(&self) -> impl Iterator<Item = &str> {
        self.descriptors.iter().map(|d| d.id.as_str())
    }
}

/// Discovers workers below a list of roots.
#[derive(Debug)]
pub struct Loader {
    catalog: WorkerCatalog,
    roots: Vec<DiscoveryRoot>,
    bus: Option<Bus>,
}

impl Loader {
    pub fn new(catalog: WorkerCatalog) -> Self {
        Self {
            catalog,
            roots: Vec::new(),
            bus: None,
        }
    }

    /// Adds a root; roots are scanned in the order they were added.
    #[must_use]
    pub fn with_root(mut self, root: DiscoveryRoot) -> Self {
        self.roots.push(root);
        self
    }

    #[must_use]
    pub fn with_roots(mut self, roots: impl IntoIterator<Item = DiscoveryRoot>) -> Self {
        self.roots.extend(roots);
        self
    }

    /// Publishes discovery events on `bus`.
    #[must_use]
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn discover(&self) -> LoadReport {
        let mut report = LoadReport::default();
        let mut seen: HashMap<WorkerId, PathBuf> = HashMap::new();

        for root in &self.roots {
            for folder in list_folders(&root.path) {
                let dir = root.entry_dir(&folder);
                let origin = dir.join(MANIFEST_FILE_NAME);
                if !origin.is_file() {
                    debug!(dir = %dir.display(), "no manifest, skipping");
                    continue;
                }
                match self.candidate(&folder, dir, origin, &seen) {
                    Ok(desc) => {
                        self.publish(
                            Event::new(EventKind::WorkerDiscovered)
                                .with_worker(desc.id.as_str())
                                .with_reason(desc.origin.display().to_string()),
                        );
                        seen.insert(desc.id.clone(), desc.origin.clone());
                        report.descriptors.push(desc);
                    }
                    Err(err) => {
                        warn!(error = %err, label = err.as_label(), "worker candidate rejected");
                        self.publish(
                            Event::new(EventKind::DiscoveryFailed).with_reason(err.to_string()),
                        );
                        report.failures.push(err);
                    }
                }
            }
        }
        report
    }

    fn candidate(
        &self,
        folder: &Path,
        dir: PathBuf,
        origin: PathBuf,
        seen: &HashMap<WorkerId, PathBuf>,
    ) -> Result<WorkerDescriptor, DiscoveryError> {
        let manifest = Manifest::read(&origin)?;

        let raw_id = match manifest.id {
            Some(id) => id,
            None => folder
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let id = WorkerId::parse(&raw_id).map_err(|reason| DiscoveryError::InvalidIdentifier {
            path: origin.clone(),
            id: raw_id.clone(),
            reason,
        })?;

        let factory = self
            .catalog
            .get(&manifest.kind)
            .ok_or_else(|| DiscoveryError::UnknownKind {
                path: origin.clone(),
                kind: manifest.kind.clone(),
            })?;

        if let Some(first) = seen.get(&id) {
            return Err(DiscoveryError::Duplicate {
                id: raw_id,
                first: first.clone(),
                rejected: origin,
            });
        }

        Ok(WorkerDescriptor {
            id,
            origin,
            dir,
            kind: manifest.kind,
            factory,
            enabled: manifest.enabled,
        })
    }

    fn publish(&self, ev: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(ev);
        }
    }
}

/// Sub-directories of `root` in name order; a missing root yields nothing.
fn list_folders(root: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(root = %root.display(), error = %err, "discovery root not readable, skipping");
            return Vec::new();
        }
    };
    let mut folders: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
        .map(|e| e.path())
        .collect();
    folders.sort();
    folders
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::worker::{FactoryFn, Worker, WorkerContext};
    use crate::error::WorkerError;

    struct Idle;

    #[async_trait::async_trait]
    impl Worker for Idle {
        async fn start(self: Arc<Self>, _ctx: WorkerContext) -> Result<(), WorkerError> {
            Ok(())
        }
    }

    fn catalog() -> WorkerCatalog {
        let mut c = WorkerCatalog::new();
        c.register(FactoryFn::new("idle", |_| Ok(Arc::new(Idle) as _)).arc());
        c
    }

    fn manifest(dir: &Path, body: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(MANIFEST_FILE_NAME), body).unwrap();
    }

    #[test]
    fn ids_default_to_folder_names() {
        let tmp = tempfile::tempdir().unwrap();
        let builtin = tmp.path().join("builtin");
        let props = tmp.path().join("props");
        manifest(&builtin.join("beat"), r#"{"kind": "idle"}"#);
        manifest(&props.join("coffin").join("backend"), r#"{"kind": "idle"}"#);
        manifest(&props.join("witch").join("backend"), r#"{"kind": "idle", "id": "cauldron"}"#);
        fs::create_dir_all(props.join("frontend_only")).unwrap();

        let report = Loader::new(catalog())
            .with_root(DiscoveryRoot::builtin(&builtin))
            .with_root(DiscoveryRoot::props(&props))
            .discover();

        let ids: Vec<_> = report.discovered_ids().collect();
        assert_eq!(ids, ["beat", "coffin", "cauldron"]);
        assert!(report.failures.is_empty());
        assert_eq!(report.descriptors[1].dir, props.join("coffin").join("backend"));
    }

    #[test]
    fn one_failure_per_bad_candidate() {
        let tmp = tempfile::tempdir().unwrap();
        manifest(&tmp.path().join("a_ok"), r#"{"kind": "idle"}"#);
        manifest(&tmp.path().join("b_unknown"), r#"{"kind": "lasers"}"#);
        manifest(&tmp.path().join("c_broken"), "{not json");
        manifest(&tmp.path().join("d_bad_id"), r#"{"kind": "idle", "id": "a/b"}"#);

        let report = Loader::new(catalog())
            .with_root(DiscoveryRoot::builtin(tmp.path()))
            .discover();

        assert_eq!(report.discovered_ids().collect::<Vec<_>>(), ["a_ok"]);
        assert_eq!(report.failures.len(), 3);
        let labels: Vec<_> = report.failures.iter().map(|e| e.as_label()).collect();
        assert_eq!(
            labels,
            [
                "discovery_unknown_kind",
                "discovery_manifest_invalid",
                "discovery_invalid_id"
            ]
        );
    }

    #[test]
    fn first_duplicate_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let builtin = tmp.path().join("builtin");
        let props = tmp.path().join("props");
        manifest(&builtin.join("x"), r#"{"kind": "idle", "id": "same"}"#);
        manifest(&props.join("same").join("backend"), r#"{"kind": "idle"}"#);

        let report = Loader::new(catalog())
            .with_root(DiscoveryRoot::builtin(&builtin))
            .with_root(DiscoveryRoot::props(&props))
            .discover();

        assert_eq!(report.descriptors.len(), 1);
        assert_eq!(report.descriptors[0].origin, builtin.join("x").join(MANIFEST_FILE_NAME));
        assert!(matches!(
            report.failures.as_slice(),
            [DiscoveryError::Duplicate { .. }]
        ));
    }

    #[test]
    fn missing_roots_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let report = Loader::new(catalog())
            .with_root(DiscoveryRoot::props(tmp.path().join("nope")))
            .discover();
        assert!(report.descriptors.is_empty());
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn failures_are_published_on_the_bus() {
        let tmp = tempfile::tempdir().unwrap();
        manifest(&tmp.path().join("x"), r#"{"kind": "lasers"}"#);
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();

        let _ = Loader::new(catalog())
            .with_root(DiscoveryRoot::builtin(tmp.path()))
            .with_bus(bus.clone())
            .discover();

        assert_eq!(rx.recv().await.unwrap().kind, EventKind::DiscoveryFailed);
    }
}
