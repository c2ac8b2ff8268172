use std::path::Path;

use log::{debug, error, info};

use crate::model::{DependencySet, ResolvedSet};

/// Receives the milestones of a bundle run. Download callbacks are invoked from
/// worker threads.
pub trait BundleProgress: Send + Sync {
    fn dependencies_loaded(&self, _dependencies: &DependencySet) {}

    fn conda_resolved(&self, _packages: &ResolvedSet) {}

    fn download_started(&self, _url: &str, _file_name: &str) {}

    fn download_finished(&self, _file_name: &str, _directory: &Path, _bytes: u64) {}

    fn download_failed(&self, _file_name: &str, _error: &str) {}

    fn pip_download_started(&self, _specifiers: &[String]) {}

    fn script_written(&self, _path: &Path) {}

    fn archive_written(&self, _path: &Path) {}

    fn bundle_completed(&self, _root: &Path) {}
}

/// Reports progress through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl BundleProgress for LogProgress {
    fn dependencies_loaded(&self, dependencies: &DependencySet) {
        info!(
            "Bundling conda dependencies {:?} and pip dependencies {:?}",
            dependencies.conda.as_deref().unwrap_or_default(),
            dependencies.pip.as_deref().unwrap_or_default()
        );
    }

    fn conda_resolved(&self, packages: &ResolvedSet) {
        info!(
            "Need the following {} conda packages: {}",
            packages.len(),
            packages
        );
    }

    fn download_started(&self, url: &str, file_name: &str) {
        info!("Fetching {} from {}", file_name, url);
    }

    fn download_finished(&self, file_name: &str, directory: &Path, bytes: u64) {
        info!("Saved {} to {}", file_name, directory.display());
        debug!("{} is {} bytes", file_name, bytes);
    }

    fn download_failed(&self, file_name: &str, error: &str) {
        error!("Failed to fetch {}: {}", file_name, error);
    }

    fn pip_download_started(&self, specifiers: &[String]) {
        info!("Downloading pip packages {:?}", specifiers);
    }

    fn script_written(&self, path: &Path) {
        info!("Wrote install script to {}", path.display());
    }

    fn archive_written(&self, path: &Path) {
        info!("Compressed bundle into {}", path.display());
    }

    fn bundle_completed(&self, root: &Path) {
        info!("Offline bundle is ready at {}", root.display());
    }
}
