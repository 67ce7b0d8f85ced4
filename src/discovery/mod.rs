//! Worker discovery: manifests on disk resolved against the compiled-in catalog.
//!
//! ## Contents
//! - [`Manifest`] the `worker.json` file format
//! - [`WorkerCatalog`] kind → [`WorkerFactory`](crate::WorkerFactory) map
//! - [`Loader`], [`DiscoveryRoot`] the filesystem scan
//! - [`WorkerDescriptor`], [`LoadReport`] scan results

mod catalog;
mod loader;
mod manifest;

pub use catalog::WorkerCatalog;
pub use loader::{DiscoveryRoot, Layout, LoadReport, Loader, WorkerDescriptor};
pub use manifest::{MANIFEST_FILE_NAME, Manifest};
