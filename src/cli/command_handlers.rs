use std::sync::Arc;

use log::{info, warn};

use crate::{
    bundle::{Bundle, BundleOptions, BundleWriter},
    fetch::Downloader,
    model::{PackageSource, ResolvedSet},
    pip::PipDownloader,
    progress::BundleProgress,
    resolver::{resolve_conda_packages, CondaSolver},
};

/// Handler to bundle command
/// 1 - Loads the dependencies
/// 2 - Resolves and downloads conda packages
/// 3 - Downloads pip packages
/// 4 - Writes the install script and optionally the archive
pub fn do_bundle(
    solver: &dyn CondaSolver,
    pip: &dyn PipDownloader,
    downloader: Arc<dyn Downloader>,
    progress: Arc<dyn BundleProgress>,
    options: &BundleOptions,
    source: &PackageSource,
) -> anyhow::Result<Bundle> {
    let dependencies = source.load()?;
    if dependencies.is_empty() {
        warn!("No conda or pip dependencies given, the bundle will only hold the install script");
    }

    let bundle = BundleWriter::new(solver, pip, downloader, progress, options).write(&dependencies)?;

    Ok(bundle)
}

/// Handler to resolve command
pub fn do_resolve(solver: &dyn CondaSolver, source: &PackageSource) -> anyhow::Result<ResolvedSet> {
    let dependencies = source.load()?;
    match dependencies.conda {
        Some(specifiers) => Ok(resolve_conda_packages(solver, &specifiers)?),
        None => {
            info!("No conda dependencies to resolve");
            Ok(ResolvedSet::default())
        }
    }
}

/// Handler to clean command
pub fn do_clean(options: &BundleOptions) -> anyhow::Result<()> {
    let install_path = options.install_path()?;
    let archive_path = options.archive_path()?;

    info!("Cleaning bundle {}.", install_path.display());
    let output1 = std::fs::remove_dir_all(&install_path);
    let output2 = std::fs::remove_file(&archive_path);

    for (output, path) in [(output1, install_path), (output2, archive_path)] {
        match output {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("{} is already removed, nothing to do", path.display());
                Ok(())
            }
            otherwise => otherwise,
        }?;
    }

    Ok(())
}
