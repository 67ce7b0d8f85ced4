//! `worker.json` manifests.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DiscoveryError;

/// File name looked up in every candidate directory.
pub const MANIFEST_FILE_NAME: &str = "worker.json";

/// Declarative description of one worker candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Catalog name of the implementation.
    pub kind: String,
    /// Identifier override; defaults to the folder name.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl Manifest {
    pub fn read(path: &Path) -> Result<Self, DiscoveryError> {
        let raw =
            std::fs::read_to_string(path).map_err(|source| DiscoveryError::ManifestUnreadable {
                path: path.to_path_buf(),
                source,
            })?;
        let manifest: Manifest =
            serde_json::from_str(&raw).map_err(|e| DiscoveryError::ManifestInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        if manifest.kind.trim().is_empty() {
            return Err(DiscoveryError::ManifestInvalid {
                path: path.to_path_buf(),
                reason: "'kind' is empty".into(),
            });
        }
        Ok(manifest)
    }
}
